use async_trait::async_trait;
use common::Error;
use serde::{Deserialize, Serialize};

/// One retrieved news article, flattened to the fields the evaluators read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "publishedAt", default)]
    pub published_at: String,
    /// Publisher name.
    #[serde(default)]
    pub source: String,
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Articles matching `query`. An empty list is a valid answer, not an error.
    async fn search(&self, query: &str) -> Result<Vec<Article>, Error>;
}

/// Source used when no news key is configured. Always returns nothing.
#[derive(Debug, Clone, Default)]
pub struct NoArticles;

#[async_trait]
impl ArticleSource for NoArticles {
    async fn search(&self, _query: &str) -> Result<Vec<Article>, Error> {
        Ok(Vec::new())
    }
}
