use vidtube_db::{ListFilter, Page};
use vidtube_types::api::{ListQuery, Paginated, SortType};

use crate::error::{ApiError, ApiResult};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Turn list query parameters into a store filter. `default_descending`
/// applies when the client sends no `sortType`.
pub fn list_filter(query: ListQuery, default_limit: u32, default_descending: bool) -> ApiResult<ListFilter> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(ApiError::validation("page must be at least 1"));
    }
    let limit = query.limit.unwrap_or(default_limit);
    if limit < 1 {
        return Err(ApiError::validation("limit must be at least 1"));
    }

    Ok(ListFilter {
        search: query.query,
        owner_id: query.user_id.map(|id| id.to_string()),
        sort_by: query.sort_by,
        descending: match query.sort_type {
            Some(SortType::Desc) => true,
            Some(SortType::Asc) => false,
            None => default_descending,
        },
        page,
        limit: limit.min(MAX_PAGE_SIZE),
    })
}

pub fn paginate<R, T>(page: Page<R>, filter: &ListFilter, convert: impl FnMut(R) -> T) -> Paginated<T> {
    let docs = page.rows.into_iter().map(convert).collect();
    Paginated::new(docs, page.total, filter.page, filter.limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let filter = list_filter(ListQuery::default(), 10, false).unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 10);
        assert!(!filter.descending);
        assert_eq!(filter.sort_by, None);
    }

    #[test]
    fn sort_type_overrides_default_direction() {
        let query = ListQuery {
            sort_type: Some(SortType::Asc),
            ..Default::default()
        };
        assert!(!list_filter(query, 10, true).unwrap().descending);
        assert!(list_filter(ListQuery::default(), 10, true).unwrap().descending);
    }

    #[test]
    fn page_zero_is_rejected() {
        let query = ListQuery {
            page: Some(0),
            ..Default::default()
        };
        assert!(matches!(list_filter(query, 10, false), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn limit_is_capped() {
        let query = ListQuery {
            limit: Some(5000),
            ..Default::default()
        };
        assert_eq!(list_filter(query, 10, false).unwrap().limit, MAX_PAGE_SIZE);
    }
}
