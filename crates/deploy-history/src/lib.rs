//! Deploy-history provider: turns a paginated, rate-limited deploy-list API
//! plus a local commit log into a deduplicated, correctly ordered,
//! commit-correlated deploy sequence.

pub mod api;
pub mod pagination;
pub mod provider;

pub use api::{DeployApi, HttpDeployApi, PageResponse};
pub use pagination::{parse_link_header, PaginationLinks};
pub use provider::{DeployHistory, DeploySource};
