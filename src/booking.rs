use std::time::Duration;

use log::{error, info, warn};
use uuid::Uuid;

use crate::backend::MarketplaceBackend;
use crate::error::{BackendError, BookingError, ValidationError};
use crate::models::{NewServiceRequest, ServiceCategory, ServiceRequest, Urgency, UserProfile};
use crate::wizard::{BookingDraft, Recurrence};

/// How long the "finding providers" screen stays up after the request is created.
pub const MATCHING_HOLD: Duration = Duration::from_secs(2);

pub fn validate(draft: &BookingDraft, profile: Option<&UserProfile>) -> Result<(), ValidationError> {
    if draft.category.is_none() || draft.title.is_none() || draft.description.is_none() || profile.is_none() {
        return Err(ValidationError::MissingFields);
    }
    if draft.recurrence == Recurrence::Recurring && draft.selected_days.is_empty() {
        return Err(ValidationError::NoRecurringDays);
    }
    Ok(())
}

pub fn build_request(draft: &BookingDraft, profile: Option<&UserProfile>) -> Result<NewServiceRequest, ValidationError> {
    validate(draft, profile)?;

    let (Some(category), Some(title), Some(description), Some(profile)) =
        (&draft.category, &draft.title, &draft.description, profile)
    else {
        return Err(ValidationError::MissingFields);
    };

    let location = draft.location.clone().unwrap_or_else(|| profile.location());
    let (latitude, longitude) = location.coordinates();

    Ok(NewServiceRequest {
        customer_id: profile.profile.id,
        category_id: category.id,
        title: title.clone(),
        description: description.clone(),
        address: location.request_address(),
        city: location.city.clone(),
        province: location.province.clone(),
        latitude,
        longitude,
        urgency: Urgency::Medium,
    })
}

/// Validates the draft, creates the request and holds for [`MATCHING_HOLD`] before
/// handing back the created record. Nothing is sent when validation fails.
pub async fn submit<B>(backend: &B, draft: &BookingDraft, profile: Option<&UserProfile>) -> Result<ServiceRequest, BookingError>
where
    B: MarketplaceBackend + ?Sized,
{
    let request = build_request(draft, profile)?;

    let created = match backend.create_service_request(&request).await {
        Ok(created) => created,
        Err(e) => {
            error!("Error submitting request: {}", e);
            return Err(e.into());
        }
    };
    info!("Created service request {} for customer {}", created.id, created.customer_id);

    tokio::time::sleep(MATCHING_HOLD).await;
    Ok(created)
}

/// Loads a created request for the customer behind `user_id`. Requests of other
/// customers come back as `None`.
pub async fn owned_request<B>(backend: &B, user_id: &str, request_id: Uuid) -> Result<Option<ServiceRequest>, BackendError>
where
    B: MarketplaceBackend + ?Sized,
{
    let Some(profile) = backend.user_profile(user_id).await? else {
        return Ok(None);
    };
    let request = backend.service_request(request_id).await?;
    if request.customer_id != profile.profile.id {
        warn!("User {} asked for request {} of another customer", user_id, request_id);
        return Ok(None);
    }
    Ok(Some(request))
}

/// Finds the category a `/book <service>` argument refers to: by id, by name, or by
/// the name's slug (`Plumbing & Leaks` -> `plumbing-leaks`).
pub fn match_category<'a>(categories: &'a [ServiceCategory], query: &str) -> Option<&'a ServiceCategory> {
    let query = query.trim();
    let wanted = query.to_lowercase();
    let wanted_slug = slug(&wanted);

    categories.iter().find(|c| {
        let name = c.name.to_lowercase();
        c.id.to_string() == wanted
            || name == wanted
            || name.split_whitespace().collect::<Vec<_>>().join("-") == wanted
            || slug(&name) == wanted_slug
    })
}

fn slug(value: &str) -> String {
    value
        .replace('&', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
