pub mod client;
pub mod models;

pub use client::RatingsClient;
pub use models::{
    CachedRatings, ClientStats, ColorRating, ColorRatingsQuery, RatingRecord, RatingsQuery,
    RatingsSource, RatingsTable, SmoothedRates,
};
