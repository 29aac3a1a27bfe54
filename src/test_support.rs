//! In-memory marketplace and fixtures shared by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::backend::{MarketplaceBackend, ProviderSearch};
use crate::error::BackendError;
use crate::models::{
    CustomerProfile, NearbyProvider, NewServiceRequest, Profile, ServiceCategory, ServiceRequest,
    ServiceRequestSummary, UserProfile,
};
use crate::wizard::{BookingDraft, SelectedCategory};

/// Records every created request; `fail` turns the create call into a database error.
#[derive(Default)]
pub struct MockBackend {
    pub created: Mutex<Vec<NewServiceRequest>>,
    pub requests: Mutex<Vec<ServiceRequest>>,
    pub profile: Option<UserProfile>,
    pub lookups: Mutex<Vec<String>>,
    pub fail: bool,
    pub latency: Duration,
}

impl MockBackend {
    pub fn with_profile(profile: UserProfile) -> Self {
        MockBackend {
            profile: Some(profile),
            ..Default::default()
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketplaceBackend for MockBackend {
    async fn service_categories(&self) -> Result<Vec<ServiceCategory>, BackendError> {
        Ok(vec![category("Plumbing"), category("Electrical Services")])
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, BackendError> {
        self.lookups.lock().unwrap().push(user_id.to_string());
        Ok(self.profile.clone())
    }

    async fn create_service_request(&self, request: &NewServiceRequest) -> Result<ServiceRequest, BackendError> {
        tokio::time::sleep(self.latency).await;
        self.created.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(BackendError::Database(sqlx::Error::PoolTimedOut));
        }
        let created = ServiceRequest {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            category_id: request.category_id,
            title: request.title.clone(),
            description: request.description.clone(),
            address: request.address.clone(),
            city: request.city.clone(),
            province: request.province.clone(),
            latitude: request.latitude,
            longitude: request.longitude,
            urgency: request.urgency,
            status: "open".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        self.requests.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn service_request(&self, request_id: Uuid) -> Result<ServiceRequest, BackendError> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .ok_or(BackendError::NotFound("service request"))
    }

    async fn find_nearby_providers(&self, _search: &ProviderSearch) -> Result<Vec<NearbyProvider>, BackendError> {
        Ok(vec![])
    }

    async fn service_history(&self, _customer_id: Uuid) -> Result<Vec<ServiceRequestSummary>, BackendError> {
        Ok(vec![])
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        profile: Profile {
            id: Uuid::new_v4(),
            full_name: Some("Thandi Mokoena".into()),
            email: None,
        },
        customer_profiles: vec![CustomerProfile {
            formatted_address: Some("14 Jan Smuts Ave, Johannesburg".into()),
            city: Some("Johannesburg".into()),
            province: Some("Gauteng".into()),
            ..Default::default()
        }],
    }
}

pub fn filled_draft() -> BookingDraft {
    BookingDraft {
        category: Some(SelectedCategory {
            id: Uuid::new_v4(),
            name: "Plumbing".into(),
        }),
        title: Some("Fix leaking kitchen tap".into()),
        description: Some("Drips constantly".into()),
        ..BookingDraft::default()
    }
}

pub fn category(name: &str) -> ServiceCategory {
    ServiceCategory {
        id: Uuid::new_v4(),
        name: name.into(),
        description: None,
        icon: None,
        color: None,
    }
}
