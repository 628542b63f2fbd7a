use std::time::SystemTime;

use compact_str::CompactString;
use serde::Serialize;
use tokio_postgres::Row;

use crate::{
    db::{DBResult, Value},
    error::MissingField,
    table::{HOT_SEARCHES, MOVIES, Table},
};

/// Something the collectors produce and the persister writes.
pub trait Record {
    const TABLE: &'static Table;

    /// Column values in `TABLE.columns` order, without the id.
    fn bind(&self, now: SystemTime) -> Result<Vec<Value>, MissingField>;
}

/// A row read back from its table.
pub trait Stored: Sized {
    const TABLE: &'static Table;

    fn from_row(row: &Row) -> DBResult<Self>;
}

/// A partial update: only the fields that are set are written.
pub trait Changeset {
    const TABLE: &'static Table;

    fn changes(&self) -> Vec<(&'static str, Value)>;
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, MissingField> {
    match value {
        Some(v) => Ok(v),
        None => Err(MissingField { field }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HotSearch {
    /// 1-based position on the board; not persisted.
    pub rank: i32,
    pub keyword: Option<CompactString>,
    pub heat: Option<i64>,
}

impl Record for HotSearch {
    const TABLE: &'static Table = &HOT_SEARCHES;

    fn bind(&self, now: SystemTime) -> Result<Vec<Value>, MissingField> {
        let keyword = require(self.keyword.clone(), "keyword")?;
        let heat = require(self.heat, "heat")?;
        Ok(vec![keyword.into(), heat.into(), now.into()])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Movie {
    pub rank: Option<i32>,
    pub title: Option<CompactString>,
    pub director: Option<CompactString>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub genre: Option<CompactString>,
    pub country: Option<CompactString>,
    pub description: Option<CompactString>,
}

impl Record for Movie {
    const TABLE: &'static Table = &MOVIES;

    fn bind(&self, _: SystemTime) -> Result<Vec<Value>, MissingField> {
        let rank = require(self.rank, "rank")?;
        let title = require(self.title.clone(), "title")?;
        Ok(vec![
            rank.into(),
            title.into(),
            self.director.clone().into(),
            self.year.into(),
            self.rating.into(),
            self.reviews_count.into(),
            self.genre.clone().into(),
            self.country.clone().into(),
            self.description.clone().into(),
        ])
    }
}

fn text(row: &Row, idx: usize) -> DBResult<CompactString> {
    row.try_get::<_, &str>(idx).map(Into::into)
}

fn opt_text(row: &Row, idx: usize) -> DBResult<Option<CompactString>> {
    row.try_get::<_, Option<&str>>(idx)
        .map(|s| s.map(Into::into))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotSearchRow {
    pub id: i64,
    pub keyword: CompactString,
    pub heat: i64,
    pub crawl_time: SystemTime,
}

impl Stored for HotSearchRow {
    const TABLE: &'static Table = &HOT_SEARCHES;

    fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            id: row.try_get(0)?,
            keyword: text(row, 1)?,
            heat: row.try_get(2)?,
            crawl_time: row.try_get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRow {
    pub id: i64,
    pub rank: i32,
    pub title: CompactString,
    pub director: Option<CompactString>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub genre: Option<CompactString>,
    pub country: Option<CompactString>,
    pub description: Option<CompactString>,
}

impl Stored for MovieRow {
    const TABLE: &'static Table = &MOVIES;

    fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            id: row.try_get(0)?,
            rank: row.try_get(1)?,
            title: text(row, 2)?,
            director: opt_text(row, 3)?,
            year: row.try_get(4)?,
            rating: row.try_get(5)?,
            reviews_count: row.try_get(6)?,
            genre: opt_text(row, 7)?,
            country: opt_text(row, 8)?,
            description: opt_text(row, 9)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotSearchUpdate {
    pub keyword: Option<CompactString>,
    pub heat: Option<i64>,
}

impl Changeset for HotSearchUpdate {
    const TABLE: &'static Table = &HOT_SEARCHES;

    fn changes(&self) -> Vec<(&'static str, Value)> {
        let mut changes = Vec::new();
        if let Some(keyword) = &self.keyword {
            changes.push(("keyword", keyword.clone().into()));
        }
        if let Some(heat) = self.heat {
            changes.push(("heat", heat.into()));
        }
        changes
    }
}

#[derive(Debug, Clone, Default)]
pub struct MovieUpdate {
    pub rank: Option<i32>,
    pub title: Option<CompactString>,
    pub director: Option<CompactString>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub genre: Option<CompactString>,
    pub country: Option<CompactString>,
    pub description: Option<CompactString>,
}

impl Changeset for MovieUpdate {
    const TABLE: &'static Table = &MOVIES;

    fn changes(&self) -> Vec<(&'static str, Value)> {
        let Self {
            rank,
            title,
            director,
            year,
            rating,
            reviews_count,
            genre,
            country,
            description,
        } = self;

        [
            ("movie_rank", rank.map(Value::from)),
            ("title", title.clone().map(Value::from)),
            ("director", director.clone().map(Value::from)),
            ("year", year.map(Value::from)),
            ("rating", rating.map(Value::from)),
            ("reviews_count", reviews_count.map(Value::from)),
            ("genre", genre.clone().map(Value::from)),
            ("country", country.clone().map(Value::from)),
            ("description", description.clone().map(Value::from)),
        ]
        .into_iter()
        .filter_map(|(column, value)| Some((column, value?)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMovie {
    pub rank: i32,
    pub title: CompactString,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenreCount {
    pub genre: Option<CompactString>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRating {
    pub year: i32,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectorRating {
    pub director: CompactString,
    pub avg_rating: f64,
}

/// The four movie aggregates, as printed by `movie-report`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieReport {
    pub top_movies: Vec<TopMovie>,
    pub genre_distribution: Vec<GenreCount>,
    pub rating_trend: Vec<YearRating>,
    pub director_ratings: Vec<DirectorRating>,
}

impl TopMovie {
    pub fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            rank: row.try_get(0)?,
            title: text(row, 1)?,
            rating: row.try_get(2)?,
        })
    }
}

impl GenreCount {
    pub fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            genre: opt_text(row, 0)?,
            count: row.try_get(1)?,
        })
    }
}

impl YearRating {
    pub fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            year: row.try_get(0)?,
            avg_rating: row.try_get(1)?,
        })
    }
}

impl DirectorRating {
    pub fn from_row(row: &Row) -> DBResult<Self> {
        Ok(Self {
            director: text(row, 0)?,
            avg_rating: row.try_get(1)?,
        })
    }
}
