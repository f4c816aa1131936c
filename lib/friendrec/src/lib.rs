pub mod api;
pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod grouping;
pub mod io;
pub mod local;
pub mod recommend;
pub mod runtime;
pub mod sort;
pub mod stats;
pub mod utils;
pub mod writer;

pub use api::{ExecutablePipeline, Grouping, Mapper, Reducer};
pub use channel::ChannelPipeline;
pub use config::RuntimeConfig;
pub use error::{ParseError, RecommendError};
pub use grouping::{HashGrouping, SortGrouping};
pub use local::LocalPipeline;
pub use recommend::{CandidateEmitter, ParsePolicy, Recommendation, RecommendationReducer, UserId};
pub use runtime::RuntimePipeline;
