//! Bet sizing. Edge/middle/scalp detection itself lives in `detection`; this
//! module turns a detected opportunity into an actual stake.

pub mod kelly;
