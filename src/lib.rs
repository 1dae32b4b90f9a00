//! Core of a fixed-size, round-robin time series database modeled on the
//! Whisper file format: one file per series, concentric ring-buffer
//! archives of increasing granularity, and cascaded aggregation from the
//! finest archive into every coarser one on each write.

pub mod murmur;

pub use murmur::{
    AggregationType, Clock, FixedClock, MurmurError, MurmurFile, Point, Result, Schema,
    SystemClock, POINT_SIZE,
};
