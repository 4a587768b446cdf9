//! Core traits and types for the Descent game engine
//!
//! This crate provides the fundamental abstraction the search engine is
//! generic over:
//! - `GameState`: a typed, immutable view of a two-player, perfect-information
//!   position, supplying legal moves, terminal predicates, and a canonical
//!   64-bit key
//! - `Player`: the side to move
//!
//! Game rules live in their own crates (see `games-tictactoe`); the search
//! engine in the `ubfm` crate only ever talks to positions through
//! `GameState`.

pub mod game;

// Re-export main types for convenience
pub use game::{GameState, KeyError, Player};
