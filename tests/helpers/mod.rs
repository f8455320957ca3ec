#![allow(dead_code)]

pub mod fixtures;
pub mod request;

pub use fixtures::{fixture_path, load_fixture, raw_fixture};
pub use request::RequestBuilder;
