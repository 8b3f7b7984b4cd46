#![allow(dead_code, unused_imports)]

pub mod builders;
pub mod db;

pub use builders::{AbacPolicyBuilder, GrantBuilder, RbacPolicyBuilder};
pub use db::{seed_model, seed_subject, SeedModel, TestDb};

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
