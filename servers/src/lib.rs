//! Shared logic for the live feed binaries (`feed_dashboard`, `feed_mock`).

pub mod feed_logic;
