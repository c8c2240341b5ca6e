use crate::{utils, CrawlerError, DatasetRow, Storage};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

#[async_trait::async_trait]
pub trait Table {
    type Record<'a>;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;

    /// Swaps the whole table content for `records` in one transaction.
    async fn replace<'a>(&self, records: Vec<Self::Record<'a>>) -> Result<(), sqlx::Error>;
}

pub struct UrlTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for UrlTable {
    type Record<'a> = &'a str;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    position INTEGER,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn replace<'a>(&self, records: Vec<Self::Record<'a>>) -> Result<(), sqlx::Error> {
        let timestamp = utils::get_now();
        let mut tx = self.get_pool().begin().await?;
        sqlx::query(&format!("DELETE FROM {}", self.name))
            .execute(&mut tx)
            .await?;

        let query = format!(
            "INSERT OR REPLACE INTO {} (id, position, created_at) VALUES (?, ?, ?)",
            &self.name
        );
        for (position, url) in records.into_iter().enumerate() {
            sqlx::query(&query)
                .bind(url)
                .bind(position as i64)
                .bind(timestamp)
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub struct DatasetTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for DatasetTable {
    type Record<'a> = &'a DatasetRow;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            position INTEGER,
                            created_at DATETIME,
                            title TEXT,
                            postcode TEXT,
                            price_val INTEGER,
                            price_type TEXT,
                            epc TEXT,
                            council_tax TEXT,
                            bed_num INTEGER,
                            bath_num INTEGER,
                            couch_num INTEGER,
                            floor_area INTEGER,
                            simd_2012_overall_rank_bar INTEGER,
                            simd_2016_overall_rank_bar INTEGER,
                            simd_2020_overall_rank_bar INTEGER
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn replace<'a>(&self, records: Vec<Self::Record<'a>>) -> Result<(), sqlx::Error> {
        let timestamp = utils::get_now();
        let mut tx = self.get_pool().begin().await?;
        sqlx::query(&format!("DELETE FROM {}", self.name))
            .execute(&mut tx)
            .await?;

        let query = format!(
            r#"INSERT OR REPLACE INTO {} (
                id,
                position,
                created_at,
                title,
                postcode,
                price_val,
                price_type,
                epc,
                council_tax,
                bed_num,
                bath_num,
                couch_num,
                floor_area,
                simd_2012_overall_rank_bar,
                simd_2016_overall_rank_bar,
                simd_2020_overall_rank_bar) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        for row in records {
            sqlx::query(&query)
                .bind(row.url.as_str())
                .bind(row.index as i64)
                .bind(timestamp)
                .bind(row.title.as_str())
                .bind(row.postcode.as_str())
                .bind(row.price_val)
                .bind(row.price_type.as_str())
                .bind(row.epc.as_str())
                .bind(row.council_tax.as_str())
                .bind(row.bed_num)
                .bind(row.bath_num)
                .bind(row.couch_num)
                .bind(row.floor_area)
                .bind(row.simd_2012_overall_rank_bar)
                .bind(row.simd_2016_overall_rank_bar)
                .bind(row.simd_2020_overall_rank_bar)
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// SQLite copy of the run outputs, one `{name}.db` file.
pub struct SqliteData {
    pub all: DatasetTable,
    pub selected: DatasetTable,
    pub unresolved: UrlTable,
}

impl SqliteData {
    pub async fn new(name: &str) -> Result<SqliteData, CrawlerError> {
        let opt = SqliteConnectOptions::new()
            .filename(format!("{}.db", name))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let p = SqliteData {
            all: DatasetTable {
                name: format!("{}_all", name),
                pool: pool.clone(),
            },
            selected: DatasetTable {
                name: format!("{}_selected", name),
                pool: pool.clone(),
            },
            unresolved: UrlTable {
                name: format!("{}_unresolved", name),
                pool,
            },
        };

        for table in &[&p.all, &p.selected] {
            tracing::debug!("Use table {}", table.name);
            table.create().await?;
        }
        tracing::debug!("Use table {}", p.unresolved.name);
        p.unresolved.create().await?;

        Ok(p)
    }
}

#[async_trait::async_trait]
impl Storage for SqliteData {
    async fn save_datasets(
        &self,
        all: &[DatasetRow],
        selected: &[DatasetRow],
    ) -> Result<(), CrawlerError> {
        self.all.replace(all.iter().collect()).await?;
        self.selected.replace(selected.iter().collect()).await?;
        Ok(())
    }

    async fn save_unresolved(&self, urls: &[String]) -> Result<(), CrawlerError> {
        let urls = urls.iter().map(String::as_str).collect();
        Ok(self.unresolved.replace(urls).await?)
    }
}
