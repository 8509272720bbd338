//! Title metadata extraction, quality/dubbing detection and relevance
//! scoring shared by the search aggregator.

pub mod dubbing;
pub mod metadata;
pub mod quality;
pub mod ranking;
