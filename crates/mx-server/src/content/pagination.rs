//! Page/size/sort translation and the paginated response envelope.

use serde::Serialize;
use serde_json::Value;

use super::ContentError;
use crate::store::{OrderedQuery, Sort, SortDirection, SortField};

/// A 1-based page request as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    pub sort_by: Option<String>,
    pub sort_order: Option<i64>,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Self {
        Self {
            page,
            size,
            sort_by: None,
            sort_order: None,
        }
    }

    pub fn sorted(mut self, field: impl Into<String>, order: i64) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    /// `skip = (page - 1) * size`, `limit = size`. The sort is taken from
    /// the request only when both field and order are present; otherwise
    /// it is `created` descending.
    pub fn to_query(&self) -> Result<OrderedQuery, ContentError> {
        if self.page <= 0 {
            return Err(ContentError::invalid(format!(
                "page must be positive, got {}",
                self.page
            )));
        }
        if self.size <= 0 {
            return Err(ContentError::invalid(format!(
                "size must be positive, got {}",
                self.size
            )));
        }

        let sort = match (self.sort_by.as_deref(), self.sort_order) {
            (Some(field), Some(order)) => {
                let field = SortField::parse(field)
                    .ok_or_else(|| ContentError::invalid(format!("cannot sort by {field:?}")))?;
                let direction = match order {
                    1 => SortDirection::Asc,
                    -1 => SortDirection::Desc,
                    other => {
                        return Err(ContentError::invalid(format!(
                            "sort order must be 1 or -1, got {other}"
                        )))
                    }
                };
                Sort::new(field, direction)
            }
            _ => Sort::created_desc(),
        };

        let page = self.page as u64;
        let size = self.size as u64;
        let skip = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| ContentError::invalid("page offset overflows"))?;

        Ok(OrderedQuery {
            skip,
            limit: size,
            sort,
        })
    }
}

/// Field selector such as `"title created"` (keep only these) or
/// `"-text -summary"` (drop these). `id` is always kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a selector. Returns `None` for a blank selector. Mixing
    /// included and excluded fields is rejected.
    pub fn parse(selector: &str) -> Result<Option<Self>, ContentError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for field in selector.split_whitespace() {
            match field.strip_prefix('-') {
                Some("") => return Err(ContentError::invalid("empty field in select")),
                Some(name) => exclude.push(name.to_string()),
                None => include.push(field.to_string()),
            }
        }
        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(Projection::Include(include))),
            (true, false) => Ok(Some(Projection::Exclude(exclude))),
            (false, false) => Err(ContentError::invalid(
                "select cannot mix included and excluded fields",
            )),
        }
    }

    /// Apply to a serialized object. Non-objects pass through.
    pub fn apply(&self, value: Value) -> Value {
        let Value::Object(mut map) = value else {
            return value;
        };
        match self {
            Projection::Include(fields) => {
                map.retain(|k, _| k == "id" || fields.iter().any(|f| f == k));
            }
            Projection::Exclude(fields) => {
                map.retain(|k, _| k == "id" || !fields.iter().any(|f| f == k));
            }
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub current_page: u64,
    pub total_page: u64,
    pub size: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    /// Derive page metadata from a validated query and the store's total.
    pub fn from_query(query: &OrderedQuery, total: u64) -> Self {
        let size = query.limit.max(1);
        let current_page = query.skip / size + 1;
        let total_page = total.div_ceil(size);
        Self {
            total,
            current_page,
            total_page,
            size: query.limit,
            has_next_page: current_page < total_page,
            has_prev_page: current_page > 1,
        }
    }
}

/// `{ data, pagination }` envelope returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, query: &OrderedQuery, total: u64) -> Self {
        Self {
            data,
            pagination: Pagination::from_query(query, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_three_of_twenty() {
        let q = PageRequest::new(3, 20).to_query().unwrap();
        assert_eq!(q.skip, 40);
        assert_eq!(q.limit, 20);
        assert_eq!(q.sort, Sort::created_desc());
    }

    #[test]
    fn non_positive_page_or_size_is_rejected() {
        assert!(matches!(
            PageRequest::new(0, 10).to_query(),
            Err(ContentError::InvalidArgument(_))
        ));
        assert!(matches!(
            PageRequest::new(1, -1).to_query(),
            Err(ContentError::InvalidArgument(_))
        ));
        assert!(PageRequest::new(1, 0).to_query().is_err());
    }

    #[test]
    fn sort_needs_both_field_and_order() {
        let both = PageRequest::new(1, 10).sorted("title", 1).to_query().unwrap();
        assert_eq!(both.sort, Sort::new(SortField::Title, SortDirection::Asc));

        let field_only = PageRequest {
            sort_by: Some("title".into()),
            ..PageRequest::new(1, 10)
        };
        assert_eq!(field_only.to_query().unwrap().sort, Sort::created_desc());

        let order_only = PageRequest {
            sort_order: Some(1),
            ..PageRequest::new(1, 10)
        };
        assert_eq!(order_only.to_query().unwrap().sort, Sort::created_desc());
    }

    #[test]
    fn bad_sort_values_are_rejected() {
        assert!(PageRequest::new(1, 10).sorted("password", 1).to_query().is_err());
        assert!(PageRequest::new(1, 10).sorted("created", 0).to_query().is_err());
    }

    #[test]
    fn huge_page_does_not_overflow() {
        assert!(PageRequest::new(i64::MAX, i64::MAX).to_query().is_err());
    }

    #[test]
    fn pagination_metadata() {
        let q = PageRequest::new(2, 10).to_query().unwrap();
        let p = Pagination::from_query(&q, 25);
        assert_eq!(p.current_page, 2);
        assert_eq!(p.total_page, 3);
        assert!(p.has_next_page);
        assert!(p.has_prev_page);

        let last = Pagination::from_query(&PageRequest::new(3, 10).to_query().unwrap(), 25);
        assert!(!last.has_next_page);

        let empty = Pagination::from_query(&PageRequest::new(1, 10).to_query().unwrap(), 0);
        assert_eq!(empty.total_page, 0);
        assert!(!empty.has_next_page && !empty.has_prev_page);
    }

    #[test]
    fn projection_include_keeps_id() {
        let p = Projection::parse("title created").unwrap().unwrap();
        let out = p.apply(json!({"id": "x", "title": "t", "text": "body", "created": 1}));
        assert_eq!(out, json!({"id": "x", "title": "t", "created": 1}));
    }

    #[test]
    fn projection_exclude() {
        let p = Projection::parse("-text -id").unwrap().unwrap();
        let out = p.apply(json!({"id": "x", "title": "t", "text": "body"}));
        assert_eq!(out, json!({"id": "x", "title": "t"}));
    }

    #[test]
    fn projection_parse_edge_cases() {
        assert_eq!(Projection::parse("  ").unwrap(), None);
        assert!(Projection::parse("title -text").is_err());
        assert!(Projection::parse("-").is_err());
    }
}
