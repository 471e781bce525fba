pub mod json;
pub mod sonar;
pub mod text;
