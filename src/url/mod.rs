//! URL handling module for Story-Harvest
//!
//! This module provides the job identifier type, search URL validation, page URL
//! construction for pagination, and story id derivation from listing links.

mod job;
mod paging;

pub use job::JobId;
pub use paging::{page_url, parse_search_url, story_id_from_link, PAGE_PARAM};
