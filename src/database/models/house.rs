//! House model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Record, now};
use crate::cache::Identifiable;

/// A registered house.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct House {
    /// Public identifier, assigned on creation
    pub uuid: Uuid,

    /// Living area in square meters
    pub area: f64,

    pub country: String,
    pub city: String,
    pub street: String,

    /// Building number on the street
    pub number: i32,

    pub create_date: DateTime<Utc>,
}

/// Body of create/update requests for a house.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRequest {
    pub area: f64,
    pub country: String,
    pub city: String,
    pub street: String,
    pub number: i32,
}

impl Identifiable for House {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Record for House {
    type Request = HouseRequest;

    fn from_request(request: HouseRequest) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            area: request.area,
            country: request.country,
            city: request.city,
            street: request.street,
            number: request.number,
            create_date: now(),
        }
    }

    fn apply(&mut self, request: HouseRequest) {
        self.area = request.area;
        self.country = request.country;
        self.city = request.city;
        self.street = request.street;
        self.number = request.number;
    }
}
