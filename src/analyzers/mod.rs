//! Ride-density analysis over the season.
//!
//! [`interval`] tiles the day into fixed buckets and builds the average day;
//! [`day_score`] compares every date against it to find the most typical one.

pub mod day_score;
pub mod interval;
pub mod types;
pub mod utility;
