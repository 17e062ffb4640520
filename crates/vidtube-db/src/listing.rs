/// Filtering, sorting and paging shared by every list query.
#[derive(Debug, Clone)]
pub struct ListFilter {
    /// Case-insensitive substring match on the resource's text field.
    pub search: Option<String>,
    pub owner_id: Option<String>,
    /// Client-facing field name, e.g. `createdAt` or `views`.
    pub sort_by: Option<String>,
    pub descending: bool,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            search: None,
            owner_id: None,
            sort_by: None,
            descending: false,
            page: 1,
            limit: 10,
        }
    }
}

pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

impl ListFilter {
    pub(crate) fn like_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    /// Build an ORDER BY clause from a whitelist of `(field, column)` pairs.
    ///
    /// Field names outside the whitelist are not an error: they sort as a
    /// constant, so rows come back in insertion order.
    pub(crate) fn order_clause(&self, columns: &[(&str, &str)], table: &str) -> String {
        let field = self.sort_by.as_deref().unwrap_or("createdAt");
        let column = columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
            .unwrap_or("NULL");
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {column} {direction}, {table}.rowid {direction}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[(&str, &str)] = &[("createdAt", "v.created_at"), ("views", "v.views")];

    #[test]
    fn order_defaults_to_created_at_ascending() {
        let filter = ListFilter::default();
        assert_eq!(
            filter.order_clause(COLUMNS, "v"),
            "ORDER BY v.created_at ASC, v.rowid ASC"
        );
    }

    #[test]
    fn unknown_sort_field_never_reaches_sql() {
        let filter = ListFilter {
            sort_by: Some("views; DROP TABLE videos".into()),
            descending: true,
            ..Default::default()
        };
        assert_eq!(filter.order_clause(COLUMNS, "v"), "ORDER BY NULL DESC, v.rowid DESC");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        let filter = ListFilter {
            search: Some(" 100%_done ".into()),
            ..Default::default()
        };
        assert_eq!(filter.like_pattern().as_deref(), Some("%100\\%\\_done%"));

        let blank = ListFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.like_pattern().is_none());
    }

    #[test]
    fn offset_is_one_based() {
        let filter = ListFilter {
            page: 3,
            limit: 10,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 20);
    }
}
