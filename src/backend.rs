use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BackendError;
use crate::models::{
    CustomerProfile, NearbyProvider, NewServiceRequest, Profile, ServiceCategory, ServiceRequest,
    ServiceRequestSummary, UserProfile,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderSearch {
    pub latitude: f64,
    pub longitude: f64,
    pub category_id: Uuid,
    pub max_distance_km: f64,
}

/// Remote marketplace API used by the bot. Every call is a single round trip.
#[async_trait]
pub trait MarketplaceBackend: Send + Sync {
    async fn service_categories(&self) -> Result<Vec<ServiceCategory>, BackendError>;

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, BackendError>;

    async fn create_service_request(&self, request: &NewServiceRequest) -> Result<ServiceRequest, BackendError>;

    async fn service_request(&self, request_id: Uuid) -> Result<ServiceRequest, BackendError>;

    async fn find_nearby_providers(&self, search: &ProviderSearch) -> Result<Vec<NearbyProvider>, BackendError>;

    async fn service_history(&self, customer_id: Uuid) -> Result<Vec<ServiceRequestSummary>, BackendError>;
}

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        PgBackend { pool }
    }
}

#[async_trait]
impl MarketplaceBackend for PgBackend {
    async fn service_categories(&self) -> Result<Vec<ServiceCategory>, BackendError> {
        let categories = sqlx::query_as::<_, ServiceCategory>(
            "SELECT id, name, description, icon, color FROM service_categories
             WHERE is_active = true
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, BackendError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, full_name, email FROM profiles WHERE auth_user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(profile) = profile else {
            return Ok(None);
        };

        let customer_profiles = sqlx::query_as::<_, CustomerProfile>(
            "SELECT formatted_address, address, city, province, latitude, longitude
             FROM customer_profiles WHERE profile_id = $1",
        )
        .bind(profile.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserProfile {
            profile,
            customer_profiles,
        }))
    }

    async fn create_service_request(&self, request: &NewServiceRequest) -> Result<ServiceRequest, BackendError> {
        let point = format!("POINT({} {})", request.longitude, request.latitude);
        let created = sqlx::query_as::<_, ServiceRequest>(
            "INSERT INTO service_requests
                (customer_id, category_id, title, description, address, city, province,
                 latitude, longitude, urgency, location)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, ST_GeogFromText($11))
             RETURNING id, customer_id, category_id, title, description, address, city, province,
                       latitude, longitude, urgency, status, created_at",
        )
        .bind(request.customer_id)
        .bind(request.category_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.address)
        .bind(&request.city)
        .bind(&request.province)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(request.urgency)
        .bind(point)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn service_request(&self, request_id: Uuid) -> Result<ServiceRequest, BackendError> {
        sqlx::query_as::<_, ServiceRequest>(
            "SELECT id, customer_id, category_id, title, description, address, city, province,
                    latitude, longitude, urgency, status, created_at
             FROM service_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BackendError::NotFound("service request"))
    }

    async fn find_nearby_providers(&self, search: &ProviderSearch) -> Result<Vec<NearbyProvider>, BackendError> {
        let providers = sqlx::query_as::<_, NearbyProvider>(
            "SELECT provider_id, business_name, full_name, distance_km, average_rating
             FROM find_nearby_providers($1, $2, $3, $4)",
        )
        .bind(search.latitude)
        .bind(search.longitude)
        .bind(search.category_id)
        .bind(search.max_distance_km)
        .fetch_all(&self.pool)
        .await?;
        Ok(providers)
    }

    async fn service_history(&self, customer_id: Uuid) -> Result<Vec<ServiceRequestSummary>, BackendError> {
        let requests = sqlx::query_as::<_, ServiceRequestSummary>(
            "SELECT r.id, r.title, r.status, c.name AS category_name, r.created_at
             FROM service_requests r
             LEFT JOIN service_categories c ON r.category_id = c.id
             WHERE r.customer_id = $1
             ORDER BY r.created_at DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }
}
