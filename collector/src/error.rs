use thiserror::Error;

/// Enumeration of failures a batch collection can surface.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("requested {requested} fetchers but the pool holds at most {capacity}")]
    OverCapacity { requested: usize, capacity: usize },

    #[error("all overflow fetchers are in use")]
    Exhausted,

    #[error("the fetcher pool is shut down")]
    Closed,

    #[error("no urls to collect")]
    EmptyBatch,

    #[error("{url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    #[error("collection was cancelled")]
    Cancelled,
}

impl CollectError {
    pub(crate) fn fetch(url: &str, source: reqwest::Error) -> Self {
        Self::Fetch {
            url: url.to_owned(),
            source,
        }
    }
}
