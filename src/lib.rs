pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod legacy;
pub mod match_groups;
pub mod match_id;
pub mod queries;
pub mod record;
pub mod schema;
pub mod team;
pub mod template;
pub mod views;

pub use error::{InputError, MatchIdError, SchemaError};
pub use match_id::MatchId;
pub use record::PlayerRecord;
pub use team::Team;
