mod publish;
mod weather_api;

pub use publish::{publish_random_weather, publish_weather};
pub use weather_api::{health_check, readiness_check, weather_forecast};
