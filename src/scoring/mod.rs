pub mod aggregate;
pub mod edit_distance;
pub mod report;
pub mod tolerance;
pub mod top_k;
