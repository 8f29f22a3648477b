//! External document-engine integration: transport codec, query
//! construction, HTTP client, result normalisation, and the per-project
//! store façades the services drive.

mod client;
mod codec;
mod error;
mod query;
mod results;
mod store;

pub use client::{EngineClient, SearchBackend};
pub use codec::{EmbeddingCodec, EncodedEmbedding, TransportEncoding, normalise};
pub use error::EngineError;
pub use query::{QuerySpec, SearchRequest, normalise_lexical_query, yql_string_literal};
pub use results::{SearchHit, normalise_response};
pub use store::{DocumentIndex, ImageIndex};
