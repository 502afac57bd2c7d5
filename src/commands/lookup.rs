//! Read-side commands: lookup, get, list

use super::open_index;
use crate::config::Config;
use crate::content::ContentId;
use crate::error::Result;
use crate::store::IndexRecord;
use serde::{Deserialize, Serialize};

/// List options
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub offset: u64,
    pub limit: u64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A page of index records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPage {
    pub total: u64,
    pub offset: u64,
    pub records: Vec<IndexRecord>,
}

/// Which content id owns `locator`
pub async fn cmd_lookup(config: &Config, locator: &str) -> Result<Option<IndexRecord>> {
    let (index, _jobs) = open_index(config).await?;
    index.find_by_locator(locator).await
}

/// The indexed locator of content `id`
pub async fn cmd_get(config: &Config, id: ContentId) -> Result<Option<IndexRecord>> {
    let (index, _jobs) = open_index(config).await?;
    index.get(id).await
}

/// Page through the index in id order
pub async fn cmd_list(config: &Config, options: ListOptions) -> Result<RecordPage> {
    let (index, _jobs) = open_index(config).await?;
    let total = index.count().await?;
    let records = index.list(options.offset, options.limit).await?;
    Ok(RecordPage {
        total,
        offset: options.offset,
        records,
    })
}

pub fn print_record(record: Option<&IndexRecord>) {
    match record {
        Some(record) => {
            println!("{}\t{}", record.id, record.locator);
            println!("  hash: {}", record.locator_hash);
        }
        None => println!("Not indexed"),
    }
}

pub fn print_records(page: &RecordPage) {
    if page.records.is_empty() {
        println!("No records (total {})", page.total);
        return;
    }

    for record in &page.records {
        println!("{:>10}  {}", record.id, record.locator);
    }
    println!(
        "\nShowing {}-{} of {}",
        page.offset + 1,
        page.offset + page.records.len() as u64,
        page.total
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_init;
    use crate::store::open_stores;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_side() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        let config = Config::load(&tmp.path().join("config.toml")).unwrap();

        let (index, _jobs) = open_stores(&config).await.unwrap();
        for raw in 1..=4 {
            let id = ContentId::new(raw).unwrap();
            index.upsert(id, &format!("/p/{}", raw)).await.unwrap();
        }

        let found = cmd_lookup(&config, "/p/3").await.unwrap().unwrap();
        assert_eq!(found.id, 3);
        assert!(cmd_lookup(&config, "/p/9").await.unwrap().is_none());

        let record = cmd_get(&config, ContentId::new(2).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.locator, "/p/2");

        let page = cmd_list(&config, ListOptions { offset: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        let ids: Vec<i64> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
