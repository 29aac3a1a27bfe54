use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ServiceCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct CustomerProfile {
    pub formatted_address: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// Profile together with the customer address rows
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub profile: Profile,
    pub customer_profiles: Vec<CustomerProfile>,
}

impl UserProfile {
    pub fn location(&self) -> Location {
        Location::from(self.customer_profiles.first().cloned().unwrap_or_default())
    }
}

pub const DEFAULT_LATITUDE: f64 = -26.2041;
pub const DEFAULT_LONGITUDE: f64 = 28.0473;

/// Read-only address snapshot taken from the customer's profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub formatted_address: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<CustomerProfile> for Location {
    fn from(c: CustomerProfile) -> Self {
        Location {
            formatted_address: non_empty(c.formatted_address),
            address: non_empty(c.address),
            city: non_empty(c.city),
            province: non_empty(c.province),
            latitude: c.latitude,
            longitude: c.longitude,
        }
    }
}

impl Location {
    pub fn display(&self) -> String {
        if let Some(formatted) = &self.formatted_address {
            return formatted.clone();
        }
        if let (Some(city), Some(province)) = (&self.city, &self.province) {
            return format!("{}, {}", city, province);
        }
        if let Some(address) = &self.address {
            return address.clone();
        }
        "Johannesburg, Gauteng".to_string()
    }

    pub fn request_address(&self) -> String {
        self.formatted_address
            .clone()
            .or_else(|| self.address.clone())
            .unwrap_or_else(|| "Address not set".to_string())
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (
            self.latitude.unwrap_or(DEFAULT_LATITUDE),
            self.longitude.unwrap_or(DEFAULT_LONGITUDE),
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceRequest {
    pub customer_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: Option<String>,
    pub province: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: Option<String>,
    pub province: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub urgency: Urgency,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRequestSummary {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub category_name: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct NearbyProvider {
    pub provider_id: Uuid,
    pub business_name: Option<String>,
    pub full_name: Option<String>,
    pub distance_km: f64,
    pub average_rating: Option<f64>,
}

impl NearbyProvider {
    pub fn display_name(&self) -> &str {
        self.business_name
            .as_deref()
            .or(self.full_name.as_deref())
            .unwrap_or("Service provider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_prefers_formatted_address() {
        let location = Location {
            formatted_address: Some("12 Main Rd, Sandton".into()),
            address: Some("12 Main Rd".into()),
            city: Some("Sandton".into()),
            province: Some("Gauteng".into()),
            ..Default::default()
        };
        assert_eq!(location.display(), "12 Main Rd, Sandton");
        assert_eq!(location.request_address(), "12 Main Rd, Sandton");
    }

    #[test]
    fn location_falls_back_to_city_then_address_then_default() {
        let city_only = Location {
            address: Some("5 Long St".into()),
            city: Some("Cape Town".into()),
            province: Some("Western Cape".into()),
            ..Default::default()
        };
        assert_eq!(city_only.display(), "Cape Town, Western Cape");
        assert_eq!(city_only.request_address(), "5 Long St");

        let address_only = Location {
            address: Some("5 Long St".into()),
            city: Some("Cape Town".into()),
            ..Default::default()
        };
        assert_eq!(address_only.display(), "5 Long St");

        let empty = Location::from(CustomerProfile::default());
        assert_eq!(empty.display(), "Johannesburg, Gauteng");
        assert_eq!(empty.request_address(), "Address not set");
        assert_eq!(empty.coordinates(), (DEFAULT_LATITUDE, DEFAULT_LONGITUDE));
    }

    #[test]
    fn blank_profile_fields_are_ignored() {
        let location = Location::from(CustomerProfile {
            formatted_address: Some("  ".into()),
            city: Some("Durban".into()),
            province: Some("KwaZulu-Natal".into()),
            latitude: Some(-29.85),
            longitude: Some(31.02),
            ..Default::default()
        });
        assert_eq!(location.display(), "Durban, KwaZulu-Natal");
        assert_eq!(location.coordinates(), (-29.85, 31.02));
    }

    #[test]
    fn urgency_binds_as_text() {
        use sqlx::{Postgres, Type};

        let text = <String as Type<Postgres>>::type_info();
        assert!(<Urgency as Type<Postgres>>::compatible(&text));
    }
}
