//! The type-indexed listing contract and the SQL every listing is built from.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use veil_store::{EntityId, EntityType, UserId};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// A library entity type that can be listed for a user.
///
/// Each type has its own filter; the exclusion anti-join, the common
/// filter, ordering and pagination are shared.
pub trait Listing: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const ENTITY_TYPE: EntityType;
    /// Columns of `Self`, qualified with the `e` alias.
    const COLUMNS: &'static str;
    type Filter: Default + PartialEq + Send + Sync;

    fn common(filter: &Self::Filter) -> &CommonFilter;

    /// Append this type's own ` AND ...` conditions.
    fn push_filter(filter: &Self::Filter, query: &mut QueryBuilder<'_, Sqlite>);

    fn is_unfiltered(filter: &Self::Filter) -> bool {
        *filter == Self::Filter::default()
    }
}

/// Conditions every entity type understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonFilter {
    /// Case-insensitive substring of the name (or title).
    pub query: Option<String>,
    /// Only these ids.
    pub ids: Option<Vec<EntityId>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Id,
    /// The title for scenes, galleries and images.
    Name,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}
impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions<F> {
    pub filter: F,
    pub sort: Sort,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}
impl<F: Default> Default for FindOptions<F> {
    fn default() -> Self {
        Self::new(F::default())
    }
}
impl<F> FindOptions<F> {
    pub fn new(filter: F) -> Self {
        Self { filter, sort: Sort::default(), page: 1, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn sorted(mut self, field: SortField, direction: Direction) -> Self {
        self.sort = Sort { field, direction };
        self
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.page == 0 {
            return Err("pages start at 1");
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err("page size must be between 1 and 1000");
        }
        Ok(())
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// One page of a listing, with the total across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
impl<T> Page<T> {
    /// Zero for a page built with `page_size: 0`.
    pub fn pages(&self) -> u64 {
        match self.page_size {
            0 => 0,
            size => self.total.div_ceil(u64::from(size)),
        }
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.pages()
    }
}

/// `FROM <table> AS e WHERE <not excluded> AND <filters>`.
///
/// Every listing statement is built on this, so none can skip the
/// exclusion anti-join.
pub(crate) fn push_visible<T: Listing>(query: &mut QueryBuilder<'_, Sqlite>, user_id: UserId, filter: &T::Filter) {
    let entity_type = T::ENTITY_TYPE;
    query.push(" FROM ").push(entity_type.table()).push(" AS e WHERE NOT EXISTS (");
    query.push("SELECT 1 FROM exclusions AS x WHERE x.user_id = ").push_bind(user_id);
    query.push(" AND x.entity_type = ").push_bind(entity_type.as_str());
    query.push(" AND x.entity_id = e.id)");

    let common = T::common(filter);
    if let Some(needle) = common.query.as_deref().filter(|q| !q.is_empty()) {
        query.push(" AND e.").push(entity_type.label_column()).push(" LIKE ");
        query.push_bind(format!("%{}%", escape_like(needle))).push(" ESCAPE '\\'");
    }
    if let Some(ids) = &common.ids {
        // One bound array, however many ids, so the variable limit never applies.
        query.push(" AND e.id IN (SELECT value FROM json_each(").push_bind(Json(ids.clone())).push("))");
    }
    T::push_filter(filter, query);
}

/// ` AND EXISTS (<subquery> ?)`, for membership in a relationship table.
pub(crate) fn push_exists(query: &mut QueryBuilder<'_, Sqlite>, subquery: &str, id: Option<EntityId>) {
    if let Some(id) = id {
        query.push(" AND EXISTS (").push(subquery).push_bind(id).push(")");
    }
}

pub(crate) fn push_order<T: Listing>(query: &mut QueryBuilder<'_, Sqlite>, sort: Sort) {
    let direction = sort.direction.as_sql();
    query.push(" ORDER BY ");
    match sort.field {
        SortField::Id => {},
        SortField::Name => {
            query.push("e.").push(T::ENTITY_TYPE.label_column()).push(" COLLATE NOCASE ").push(direction).push(", ");
        },
        SortField::CreatedAt => {
            query.push("e.created_at ").push(direction).push(", ");
        },
    }
    // Ties always break on id so consecutive pages never overlap.
    query.push("e.id ").push(direction);
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("beach", "beach")]
    #[case("100%", "100\\%")]
    #[case("a_b", "a\\_b")]
    #[case("c:\\", "c:\\\\")]
    fn test_escape_like(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_like(input), expected);
    }

    #[rstest]
    #[case(1, 10, Ok(()))]
    #[case(0, 10, Err("pages start at 1"))]
    #[case(1, 0, Err("page size must be between 1 and 1000"))]
    #[case(1, MAX_PAGE_SIZE + 1, Err("page size must be between 1 and 1000"))]
    fn test_validate(#[case] page: u32, #[case] page_size: u32, #[case] expected: Result<(), &'static str>) {
        assert_eq!(FindOptions::new(()).page(page, page_size).validate(), expected);
    }

    #[test]
    fn test_offset() {
        assert_eq!(FindOptions::new(()).page(3, 10).offset(), 20);
    }

    #[rstest]
    #[case(25, 10, 3)]
    #[case(20, 10, 2)]
    #[case(0, 10, 0)]
    #[case(25, 0, 0)]
    fn test_page_count(#[case] total: u64, #[case] page_size: u32, #[case] pages: u64) {
        let page: Page<()> = Page { items: vec![], total, page: 1, page_size };
        assert_eq!(page.pages(), pages);
    }
}
