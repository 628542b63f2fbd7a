//! Single-statement operations: one connection per call, autocommit writes.

use tokio_postgres::Row;

use crate::{
    config::DbConfig,
    db::{self, Conn, DBResult, Source, Value},
    error::{StoreError, StoreResult},
    model::{
        Changeset, DirectorRating, GenreCount, MovieReport, Record, Stored, TopMovie, YearRating,
    },
    persist::{self, BatchOutcome, Connector},
    table::MOVIES,
};

#[derive(Debug, Clone)]
pub struct Store {
    source: Source,
}

impl Store {
    /// Opens a fresh connection for every operation.
    #[must_use]
    pub fn direct(config: &DbConfig) -> Self {
        Self::from_pg_config(config.to_pg_config())
    }

    #[must_use]
    pub const fn from_pg_config(config: tokio_postgres::Config) -> Self {
        Self {
            source: Source::Direct(config),
        }
    }

    pub async fn pooled(config: &DbConfig) -> StoreResult<Self> {
        let pool = db::build_pool(config).await.map_err(StoreError::connect)?;
        tracing::info!(target: "store", "pool of {} connections ready", config.pool_size);
        Ok(Self {
            source: Source::Pooled(pool),
        })
    }

    async fn conn(&self) -> StoreResult<Conn> {
        self.source.connect().await.map_err(StoreError::connect)
    }

    pub async fn insert_batch<R: Record>(&self, records: &[R]) -> StoreResult<BatchOutcome> {
        persist::insert_batch(&self.source, records).await
    }

    pub async fn insert_one<R: Record>(&self, record: &R) -> StoreResult<Option<i64>> {
        persist::insert_one(&self.source, record).await
    }

    /// Writes the fields set in `changes`. Returns whether a row changed;
    /// an empty changeset returns `false` without touching the database.
    pub async fn update<C: Changeset>(&self, id: i64, changes: &C) -> StoreResult<bool> {
        let table = C::TABLE;
        let changes = changes.changes();
        let columns = changes.iter().map(|(c, _)| *c).collect::<Vec<_>>();
        let Some(sql) = table.update_sql(&columns) else {
            tracing::info!(target: "store", "{}: no fields to update for #{id}", table.name);
            return Ok(false);
        };

        let values = changes.into_iter().map(|(_, v)| v).collect::<Vec<_>>();
        let id = [Value::Int(id)];
        let conn = self.conn().await?;
        let n = conn
            .execute(&sql, &db::params(&values, &id))
            .await
            .map_err(StoreError::statement(table.name))?;

        tracing::info!(target: "store", "{}: updated {n} row(s)", table.name);
        Ok(n > 0)
    }

    pub async fn delete<S: Stored>(&self, id: i64) -> StoreResult<bool> {
        let table = S::TABLE;
        let conn = self.conn().await?;
        let n = conn
            .execute(&table.delete_sql(), &[&id])
            .await
            .map_err(StoreError::statement(table.name))?;

        tracing::info!(target: "store", "{}: deleted {n} row(s)", table.name);
        Ok(n > 0)
    }

    pub async fn get<S: Stored>(&self, id: i64) -> StoreResult<Option<S>> {
        let table = S::TABLE;
        let conn = self.conn().await?;
        let row = conn
            .query_opt(&table.select_by_id_sql(), &[&id])
            .await
            .map_err(StoreError::statement(table.name))?;

        if row.is_none() {
            tracing::debug!(target: "store", "{}: no row with id {id}", table.name);
        }
        row.as_ref()
            .map(S::from_row)
            .transpose()
            .map_err(StoreError::statement(table.name))
    }

    pub async fn all<S: Stored>(&self) -> StoreResult<Vec<S>> {
        let table = S::TABLE;
        let conn = self.conn().await?;
        let rows = conn
            .query(&table.select_all_sql(), &[])
            .await
            .map_err(StoreError::statement(table.name))?;

        decode(&rows, S::from_row).map_err(StoreError::statement(table.name))
    }

    /// Movies ranked `1..=limit`, best first.
    pub async fn top_movies(&self, limit: i32) -> StoreResult<Vec<TopMovie>> {
        const SQL: &str = "select movie_rank, title, rating from movies where movie_rank <= $1 order by movie_rank";
        self.report(SQL, &[&limit], TopMovie::from_row).await
    }

    /// The `limit` most frequent genres with their movie counts.
    pub async fn genre_distribution(&self, limit: i64) -> StoreResult<Vec<GenreCount>> {
        const SQL: &str = "select genre, count(*) as count from movies group by genre order by count desc limit $1";
        self.report(SQL, &[&limit], GenreCount::from_row).await
    }

    /// Average rating per release year, oldest first.
    pub async fn rating_trend(&self) -> StoreResult<Vec<YearRating>> {
        const SQL: &str = "select year, avg(rating)::float8 as avg_rating from movies where year is not null and rating is not null group by year order by year";
        self.report(SQL, &[], YearRating::from_row).await
    }

    /// Average rating of the `limit` directors with the most movies.
    pub async fn director_ratings(&self, limit: i64) -> StoreResult<Vec<DirectorRating>> {
        const SQL: &str = "select director, avg(rating)::float8 as avg_rating from movies where director is not null and rating is not null group by director order by count(*) desc, director limit $1";
        self.report(SQL, &[&limit], DirectorRating::from_row).await
    }

    /// All four aggregates, queried one after another.
    pub async fn movie_report(
        &self,
        top: i32,
        genres: i64,
        directors: i64,
    ) -> StoreResult<MovieReport> {
        Ok(MovieReport {
            top_movies: self.top_movies(top).await?,
            genre_distribution: self.genre_distribution(genres).await?,
            rating_trend: self.rating_trend().await?,
            director_ratings: self.director_ratings(directors).await?,
        })
    }

    async fn report<T>(
        &self,
        sql: &'static str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        f: fn(&Row) -> DBResult<T>,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(sql, params)
            .await
            .map_err(StoreError::statement(MOVIES.name))?;

        decode(&rows, f).map_err(StoreError::statement(MOVIES.name))
    }
}

fn decode<T>(rows: &[Row], f: fn(&Row) -> DBResult<T>) -> DBResult<Vec<T>> {
    rows.iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HotSearch, HotSearchRow, MovieUpdate};

    fn unreachable() -> Store {
        let mut config = tokio_postgres::Config::new();
        config
            .host("127.0.0.1")
            .port(1)
            .user("nobody")
            .dbname("nothing")
            .connect_timeout(core::time::Duration::from_secs(1));
        Store::from_pg_config(config)
    }

    #[tokio::test]
    async fn empty_update_is_a_noop() {
        let store = unreachable();

        let updated = store.update(1, &MovieUpdate::default()).await.unwrap();

        assert!(!updated);
    }

    #[tokio::test]
    async fn report_stops_at_the_first_failure() {
        let store = unreachable();

        let err = store.movie_report(10, 10, 10).await.unwrap_err();

        assert!(err.is_connect());
    }

    #[tokio::test]
    async fn empty_batch_needs_no_database() {
        let store = unreachable();

        let outcome = store.insert_batch::<HotSearch>(&[]).await.unwrap();

        assert!(outcome.is_noop());
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connect_error() {
        let store = unreachable();

        let err = store.get::<HotSearchRow>(1).await.unwrap_err();
        assert!(err.is_connect());

        let update = MovieUpdate {
            rating: Some(8.0),
            ..MovieUpdate::default()
        };
        let err = store.update(1, &update).await.unwrap_err();
        assert!(err.is_connect());
    }
}
