use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{StoreError, SupabaseClient};

use crate::models::{Specialist, SpecialistError, SpecialtySummary};

pub struct DirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl DirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// List the specialties that currently have at least one active
    /// specialist, with a headcount per specialty.
    pub async fn list_specialties(
        &self,
        auth_token: &str,
    ) -> Result<Vec<SpecialtySummary>, SpecialistError> {
        debug!("Listing specialties");

        let path = "/rest/v1/specialists?select=specialty&is_active=eq.true";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| SpecialistError::DatabaseError(e.to_string()))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in result {
            if let Some(specialty) = row["specialty"].as_str() {
                *counts.entry(specialty.to_string()).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(specialty, specialist_count)| SpecialtySummary {
                specialty,
                specialist_count,
            })
            .collect())
    }

    /// List active specialists, optionally narrowed to one specialty.
    pub async fn list_specialists(
        &self,
        specialty: Option<&str>,
        auth_token: &str,
    ) -> Result<Vec<Specialist>, SpecialistError> {
        debug!("Listing specialists for specialty {:?}", specialty);

        let mut path = "/rest/v1/specialists?is_active=eq.true&order=full_name.asc".to_string();
        if let Some(specialty) = specialty {
            path.push_str(&format!("&specialty=eq.{}", urlencoding::encode(specialty)));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SpecialistError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Specialist>, _>>()
            .map_err(|e| SpecialistError::DatabaseError(format!("Failed to parse specialists: {}", e)))
    }

    pub async fn get_specialist(
        &self,
        specialist_id: Uuid,
        auth_token: &str,
    ) -> Result<Specialist, SpecialistError> {
        debug!("Fetching specialist: {}", specialist_id);

        let path = format!("/rest/v1/specialists?id=eq.{}", specialist_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => SpecialistError::NotFound,
                other => SpecialistError::DatabaseError(other.to_string()),
            })?;

        if result.is_empty() {
            return Err(SpecialistError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| SpecialistError::DatabaseError(format!("Failed to parse specialist: {}", e)))
    }
}
