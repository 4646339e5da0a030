mod api;
mod weather;

pub use api::{HealthResponse, MessagePublishResponse, PublishMessageRequest};
pub use weather::{
    HTTP_PUBLISHER_SOURCE, LOCATIONS, MAX_RANDOM_TEMPERATURE_C, MIN_RANDOM_TEMPERATURE_C,
    RANDOM_PUBLISHER_SOURCE, SUMMARIES, WeatherForecast, WeatherUpdateMessage, fahrenheit_of,
};
