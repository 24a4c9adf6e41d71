//! Person model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Record, now};
use crate::cache::Identifiable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sex {
    Male,
    Female,
}

/// A person living in one of the registered houses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub uuid: Uuid,
    pub name: String,
    pub surname: String,
    pub sex: Sex,

    /// Two capital letters, e.g. "MP"
    pub passport_series: String,
    pub passport_number: String,

    pub house_of_residence_uuid: Uuid,

    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

/// Body of create/update requests for a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRequest {
    pub name: String,
    pub surname: String,
    pub sex: Sex,
    pub passport_series: String,
    pub passport_number: String,
    pub house_of_residence_uuid: Uuid,
}

impl Identifiable for Person {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.uuid
    }
}

impl Record for Person {
    type Request = PersonRequest;

    fn from_request(request: PersonRequest) -> Self {
        let created = now();
        Self {
            uuid: Uuid::new_v4(),
            name: request.name,
            surname: request.surname,
            sex: request.sex,
            passport_series: request.passport_series,
            passport_number: request.passport_number,
            house_of_residence_uuid: request.house_of_residence_uuid,
            create_date: created,
            update_date: created,
        }
    }

    fn apply(&mut self, request: PersonRequest) {
        self.name = request.name;
        self.surname = request.surname;
        self.sex = request.sex;
        self.passport_series = request.passport_series;
        self.passport_number = request.passport_number;
        self.house_of_residence_uuid = request.house_of_residence_uuid;
        self.update_date = now();
    }
}
