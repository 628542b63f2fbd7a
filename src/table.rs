//! Static descriptions of the target tables and the statements run on them.
//!
//! Every table has a `bigint` primary key `id` owned by this crate (never a
//! sequence), followed by the columns listed here, in bind order.

use core::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Every row is written; a conflict is a statement error.
    Always,
    /// A row conflicting on the unique column is silently not written.
    IgnoreOn(&'static str),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub policy: DuplicatePolicy,
}

pub const HOT_SEARCHES: Table = Table {
    name: "hot_searches",
    columns: &["keyword", "heat", "crawl_time"],
    policy: DuplicatePolicy::Always,
};

pub const MOVIES: Table = Table {
    name: "movies",
    columns: &[
        "movie_rank",
        "title",
        "director",
        "year",
        "rating",
        "reviews_count",
        "genre",
        "country",
        "description",
    ],
    policy: DuplicatePolicy::IgnoreOn("title"),
};

impl Table {
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Keeps other writers from inserting until the transaction ends.
    #[must_use]
    pub fn lock_sql(&self) -> String {
        format!("lock table {} in share row exclusive mode", self.name)
    }

    #[must_use]
    pub fn max_id_sql(&self) -> String {
        format!("select coalesce(max(id), 0)::bigint from {}", self.name)
    }

    /// `$1` is the id, the columns follow in order.
    #[must_use]
    pub fn insert_sql(&self) -> String {
        let mut sql = format!("insert into {} (id", self.name);
        for column in self.columns {
            let _ = write!(sql, ", {column}");
        }
        sql.push_str(") values ($1");
        for i in 0..self.columns.len() {
            let _ = write!(sql, ", ${}", i + 2);
        }
        sql.push(')');
        if let DuplicatePolicy::IgnoreOn(key) = self.policy {
            let _ = write!(sql, " on conflict ({key}) do nothing");
        }
        sql
    }

    #[must_use]
    pub fn select_sql(&self) -> String {
        format!("select id, {} from {}", self.columns.join(", "), self.name)
    }

    #[must_use]
    pub fn select_by_id_sql(&self) -> String {
        format!("{} where id = $1", self.select_sql())
    }

    #[must_use]
    pub fn select_all_sql(&self) -> String {
        format!("{} order by id", self.select_sql())
    }

    #[must_use]
    pub fn delete_sql(&self) -> String {
        format!("delete from {} where id = $1", self.name)
    }

    /// `None` when there is nothing to set; the id binds after the values.
    #[must_use]
    pub fn update_sql(&self, columns: &[&'static str]) -> Option<String> {
        if columns.is_empty() {
            return None;
        }
        let mut sql = format!("update {} set ", self.name);
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "{column} = ${}", i + 1);
        }
        let _ = write!(sql, " where id = ${}", columns.len() + 1);
        Some(sql)
    }
}
