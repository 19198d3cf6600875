//! Query parameter parsing and Elasticsearch query translation

pub mod params;
pub mod translator;
pub mod types;

pub use params::{
    ListQueryParams, PageQueryParams, RawParams, RecordFilterParams, SearchRequestParams,
    StatsQueryParams,
};
pub use translator::{Endpoint, IndexAllowList, QueryTranslator, TranslatedRequest};
pub use types::*;
