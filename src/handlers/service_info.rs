use super::AppState;
use crate::types::{Format, ServiceInfo};
use axum::{Json, extract::State};

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        id: "org.example.genoreach".to_string(),
        name: "genoreach".to_string(),
        description: Some("Range queries over indexed genomic files".to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        formats: vec![Format::Bam, Format::Tabix, Format::Fasta],
        dictionary: state.dictionary.is_some(),
    })
}
