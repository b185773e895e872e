//! News article retrieval.
//!
//! An [`ArticleSource`] contract plus a NewsAPI `/v2/everything` client and a
//! null source for running without a key.

pub mod rest;
pub mod types;

pub use rest::{NewsApiClient, NewsClientConfig};
pub use types::{Article, ArticleSource, NoArticles};
