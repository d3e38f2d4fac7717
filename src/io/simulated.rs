//! Simulated providers and synthetic users for local runs and load tests
//!
//! Latency is injected with `tokio::time::sleep` so many simulated calls
//! overlap on the runtime the same way real network calls would.

use crate::domain::types::{Attraction, AttractionId, Location, UserId, VisitedLocation};
use crate::domain::user::User;
use crate::error::ProviderError;
use crate::io::providers::{AttractionProvider, LocationProvider, RewardPointsProvider};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Web-mercator latitude limit used when generating random positions
const MAX_LATITUDE: f64 = 85.05112878;
const MAX_LONGITUDE: f64 = 180.0;
/// Synthetic history timestamps fall within this many days before now
const HISTORY_WINDOW_DAYS: i64 = 30;

fn random_location() -> Location {
    let mut rng = rand::thread_rng();
    Location::new(
        rng.gen_range(-MAX_LATITUDE..=MAX_LATITUDE),
        rng.gen_range(-MAX_LONGITUDE..=MAX_LONGITUDE),
    )
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Location provider returning a random position anywhere on the globe
pub struct SimulatedLocationProvider {
    latency: Duration,
}

impl SimulatedLocationProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl LocationProvider for SimulatedLocationProvider {
    async fn current_location(&self, user_id: UserId) -> Result<VisitedLocation, ProviderError> {
        simulate_latency(self.latency).await;
        Ok(VisitedLocation::new(user_id, random_location(), Utc::now()))
    }
}

/// Points provider returning a random value in 1..=1000
pub struct SimulatedRewardPointsProvider {
    latency: Duration,
}

impl SimulatedRewardPointsProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl RewardPointsProvider for SimulatedRewardPointsProvider {
    async fn attraction_reward_points(
        &self,
        _attraction_id: AttractionId,
        _user_id: UserId,
    ) -> Result<i32, ProviderError> {
        simulate_latency(self.latency).await;
        Ok(rand::thread_rng().gen_range(1..=1000))
    }
}

/// Catalog provider serving a fixed list of attractions
pub struct StaticAttractionProvider {
    attractions: Vec<Attraction>,
}

impl StaticAttractionProvider {
    pub fn new(attractions: Vec<Attraction>) -> Self {
        Self { attractions }
    }

    /// Catalog of well-known US attractions
    pub fn builtin() -> Self {
        Self::new(builtin_attractions())
    }
}

#[async_trait]
impl AttractionProvider for StaticAttractionProvider {
    async fn attractions(&self) -> Result<Vec<Attraction>, ProviderError> {
        Ok(self.attractions.clone())
    }
}

pub fn builtin_attractions() -> Vec<Attraction> {
    vec![
        Attraction::new("Disneyland", "Anaheim", "CA", 33.817595, -117.922008),
        Attraction::new("Jackson Hole", "Jackson Hole", "WY", 43.582767, -110.821999),
        Attraction::new("Mojave National Preserve", "Kelso", "CA", 35.141689, -115.510399),
        Attraction::new("Joshua Tree National Park", "Joshua Tree National Park", "CA", 33.881866, -115.90065),
        Attraction::new("Buffalo National River", "St Joe", "AR", 35.985512, -92.757652),
        Attraction::new("Hot Springs National Park", "Hot Springs", "AR", 34.52153, -93.042267),
        Attraction::new("Kartchner Caverns State Park", "Benson", "AZ", 31.837551, -110.347382),
        Attraction::new("Legend Valley", "Thornville", "OH", 39.937778, -82.40667),
        Attraction::new("Flowers Bakery of London", "Flowers Bakery of London", "KY", 37.131527, -84.07486),
        Attraction::new("McKinley Tower", "Anchorage", "AK", 61.218887, -149.877502),
        Attraction::new("Flatiron Building", "New York City", "NY", 40.741112, -73.989723),
        Attraction::new("Fallingwater", "Mill Run", "PA", 39.906113, -79.468056),
        Attraction::new("Union Station", "Washington D.C.", "CA", 38.897095, -77.006332),
        Attraction::new("Roger Dean Stadium", "Jupiter", "FL", 26.890959, -80.116577),
        Attraction::new("Texas Memorial Stadium", "Austin", "TX", 30.283682, -97.732536),
        Attraction::new("Bryant-Denny Stadium", "Tuscaloosa", "AL", 33.208973, -87.550438),
        Attraction::new("Tiger Stadium", "Baton Rouge", "LA", 30.412035, -91.183815),
        Attraction::new("Neyland Stadium", "Knoxville", "TN", 35.955013, -83.925011),
        Attraction::new("Kyle Field", "College Station", "TX", 30.61025, -96.339844),
        Attraction::new("San Diego Zoo", "San Diego", "CA", 32.735317, -117.149048),
        Attraction::new("Zoo Tampa at Lowry Park", "Tampa", "FL", 28.012804, -82.469269),
        Attraction::new("Franklin Park Zoo", "Boston", "MA", 42.302601, -71.086731),
        Attraction::new("El Paso Zoo", "El Paso", "TX", 31.769125, -106.44487),
        Attraction::new("Kansas City Zoo", "Kansas City", "MO", 39.007504, -94.529625),
        Attraction::new("Bronx Zoo", "Bronx", "NY", 40.852905, -73.872971),
        Attraction::new("Cinderella Castle", "Orlando", "FL", 28.419411, -81.5812),
    ]
}

/// Generate `count` synthetic users, each with `history_len` random visits
///
/// Visit timestamps are spread over the last 30 days.
pub fn generate_users(count: usize, history_len: usize) -> Vec<Arc<User>> {
    (0..count)
        .map(|i| {
            let user_name = format!("internalUser{i}");
            let email = format!("{user_name}@tourGuide.com");
            let user = User::new(UserId::new(), &user_name, "000", &email);

            for _ in 0..history_len {
                let days_ago = rand::thread_rng().gen_range(0..HISTORY_WINDOW_DAYS);
                let time_visited = Utc::now() - ChronoDuration::days(days_ago);
                user.add_visited_location(VisitedLocation::new(user.id(), random_location(), time_visited));
            }

            Arc::new(user)
        })
        .collect()
}
