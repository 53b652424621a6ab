//! Query-string handling for `GET /api/books/`.
//!
//! The raw parameters arrive as strings so that a malformed number becomes a
//! field-level validation error instead of an opaque extractor rejection.
//! Keys this module does not know about are dropped by serde.

use std::borrow::Cow;

use serde::Deserialize;
use sqlx::QueryBuilder;
use utoipa::IntoParams;
use validator::{ValidationError, ValidationErrors};

use crate::db::Db;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Exact title.
    pub title: Option<String>,
    /// Exact publication year.
    pub publication_year: Option<String>,
    /// Exact author id; it must name an existing author.
    pub author: Option<String>,
    /// Terms matched against the title and the author's name, case-insensitively.
    pub search: Option<String>,
    /// Comma-separated `title` / `publication_year`, `-` prefix for descending.
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Title,
    PublicationYear,
}

impl OrderField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(OrderField::Title),
            "publication_year" => Some(OrderField::PublicationYear),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            OrderField::Title => "b.title",
            OrderField::PublicationYear => "b.publication_year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: OrderField,
    pub descending: bool,
}

const DEFAULT_ORDERING: [OrderKey; 1] = [OrderKey {
    field: OrderField::Title,
    descending: false,
}];

/// Parsed, typed form of [`BookQuery`].
#[derive(Debug, Default, PartialEq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub author: Option<i64>,
    pub search_terms: Vec<String>,
    pub ordering: Vec<OrderKey>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn not_a_number() -> ValidationError {
    ValidationError::new("invalid").with_message(Cow::Borrowed("Enter a number."))
}

fn parse_ordering(raw: Option<&str>) -> Vec<OrderKey> {
    let mut keys: Vec<OrderKey> = Vec::new();
    for term in raw.unwrap_or_default().split(',').map(str::trim) {
        let (name, descending) = match term.strip_prefix('-') {
            Some(name) => (name, true),
            None => (term, false),
        };
        let Some(field) = OrderField::parse(name) else {
            continue;
        };
        if keys.iter().all(|k| k.field != field) {
            keys.push(OrderKey { field, descending });
        }
    }
    if keys.is_empty() {
        keys.extend(DEFAULT_ORDERING);
    }
    keys
}

fn split_search_terms(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `%term%` for a case-insensitive LIKE, with the term's own wildcards escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl TryFrom<BookQuery> for BookFilter {
    type Error = ValidationErrors;

    fn try_from(query: BookQuery) -> Result<Self, Self::Error> {
        let mut errors = ValidationErrors::new();

        let publication_year = match non_empty(query.publication_year) {
            Some(raw) => match raw.trim().parse::<i32>() {
                Ok(year) => Some(year),
                Err(_) => {
                    errors.add("publication_year", not_a_number());
                    None
                }
            },
            None => None,
        };
        let author = match non_empty(query.author) {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("author", not_a_number());
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(BookFilter {
            title: non_empty(query.title).map(|t| t.trim().to_owned()),
            publication_year,
            author,
            search_terms: split_search_terms(query.search.as_deref()),
            ordering: parse_ordering(query.ordering.as_deref()),
        })
    }
}

impl BookFilter {
    /// Appends the WHERE and ORDER BY clauses to a query selecting from
    /// `books b JOIN authors a`.
    pub fn push_clauses(&self, qb: &mut QueryBuilder<'_, Db>) {
        qb.push(" WHERE 1 = 1");

        if let Some(title) = &self.title {
            qb.push(" AND b.title = ").push_bind(title.clone());
        }
        if let Some(year) = self.publication_year {
            qb.push(" AND b.publication_year = ").push_bind(year);
        }
        if let Some(author) = self.author {
            qb.push(" AND b.author_id = ").push_bind(author);
        }
        // Every term has to hit at least one of the searched columns.
        for term in &self.search_terms {
            let pattern = like_pattern(term);
            qb.push(" AND (LOWER(b.title) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(a.name) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        qb.push(" ORDER BY ");
        for key in &self.ordering {
            qb.push(key.field.column())
                .push(if key.descending { " DESC, " } else { " ASC, " });
        }
        qb.push("b.id ASC");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BookQuery {
        let mut q = BookQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "title" => q.title = v,
                "publication_year" => q.publication_year = v,
                "author" => q.author = v,
                "search" => q.search = v,
                "ordering" => q.ordering = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn empty_query_orders_by_title() {
        let filter = BookFilter::try_from(BookQuery::default()).unwrap();
        assert_eq!(filter.ordering, DEFAULT_ORDERING.to_vec());
        assert!(filter.search_terms.is_empty());
        assert_eq!(filter.publication_year, None);
    }

    #[test]
    fn ordering_keeps_valid_keys_in_order() {
        let filter = BookFilter::try_from(query(&[(
            "ordering",
            "-publication_year, bogus ,title",
        )]))
        .unwrap();
        assert_eq!(
            filter.ordering,
            vec![
                OrderKey {
                    field: OrderField::PublicationYear,
                    descending: true,
                },
                OrderKey {
                    field: OrderField::Title,
                    descending: false,
                },
            ]
        );
    }

    #[test]
    fn unknown_ordering_falls_back_to_default() {
        let filter = BookFilter::try_from(query(&[("ordering", "-id,author")])).unwrap();
        assert_eq!(filter.ordering, DEFAULT_ORDERING.to_vec());
    }

    #[test]
    fn numbers_are_validated_per_field() {
        let errors =
            BookFilter::try_from(query(&[("publication_year", "nineteen"), ("author", "x")]))
                .unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("publication_year"));
        assert!(fields.contains_key("author"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let filter =
            BookFilter::try_from(query(&[("title", ""), ("publication_year", " ")])).unwrap();
        assert_eq!(filter.title, None);
        assert_eq!(filter.publication_year, None);
    }

    #[test]
    fn exact_title_is_trimmed() {
        let filter = BookFilter::try_from(query(&[("title", "  Dune ")])).unwrap();
        assert_eq!(filter.title.as_deref(), Some("Dune"));
    }

    #[test]
    fn search_splits_on_spaces_and_commas() {
        let filter = BookFilter::try_from(query(&[("search", "fall,  apart things")])).unwrap();
        assert_eq!(filter.search_terms, vec!["fall", "apart", "things"]);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("100%_A"), "%100\\%\\_a%");
    }

    #[test]
    fn clauses_include_every_filter() {
        let filter = BookFilter::try_from(query(&[
            ("title", "1984"),
            ("publication_year", "1949"),
            ("search", "orwell"),
            ("ordering", "-title"),
        ]))
        .unwrap();
        let mut qb = QueryBuilder::<Db>::new(
            "SELECT b.id FROM books b JOIN authors a ON a.id = b.author_id",
        );
        filter.push_clauses(&mut qb);
        let sql = qb.sql();
        assert!(sql.contains("b.title = "));
        assert!(sql.contains("b.publication_year = "));
        assert!(sql.contains("LOWER(a.name) LIKE "));
        assert!(sql.ends_with("ORDER BY b.title DESC, b.id ASC"));
    }
}
