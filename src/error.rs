// Error type shared by the fetch, feature, model and plotting modules.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to fetch games for {team}: {source}")]
    Fetch {
        team: String,
        #[source]
        source: Box<Error>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("unknown team abbreviation: {0}")]
    UnknownTeam(String),

    /// A game row references a team id outside the registry.
    #[error("team id {0} is not in the team registry")]
    UnknownTeamId(i64),

    #[error("category {0} was not seen when the encoder was fitted")]
    UnseenCategory(i64),

    #[error("no game history for team {0}")]
    EmptyHistory(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
