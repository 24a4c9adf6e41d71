//! MongoDB database wrapper and document repository.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{Person, Record};
use super::repository::{KeyOf, Page, Repository, RepositoryError, Residents};

/// Field every stored document is keyed by.
const KEY_FIELD: &str = "uuid";

/// Field list queries are ordered by.
const CREATED_FIELD: &str = "createDate";

/// Timestamps kept as BSON dates so they order chronologically.
const DATE_FIELDS: [&str; 2] = [CREATED_FIELD, "updateDate"];

/// Field linking a person to the house they live in.
const RESIDENCE_FIELD: &str = "houseOfResidenceUuid";

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if connection or the initial ping fails.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, RepositoryError> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get an untyped collection from the database.
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

/// Encode an entity, turning its timestamp strings into BSON dates.
fn to_stored<T: Serialize>(entity: &T) -> Result<Document, RepositoryError> {
    let mut document = bson::to_document(entity)?;
    for field in DATE_FIELDS {
        let millis = match document.get(field) {
            Some(Bson::String(text)) => DateTime::parse_from_rfc3339(text)?.timestamp_millis(),
            _ => continue,
        };
        document.insert(field, bson::DateTime::from_millis(millis));
    }
    Ok(document)
}

/// Decode a stored document. Dates written as strings are read as is.
fn from_stored<T: DeserializeOwned>(mut document: Document) -> Result<T, RepositoryError> {
    for field in DATE_FIELDS {
        let millis = match document.get(field) {
            Some(Bson::DateTime(date)) => date.timestamp_millis(),
            _ => continue,
        };
        let date = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or(RepositoryError::DateOutOfRange(millis))?;
        document.insert(field, date.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    Ok(bson::from_document(document)?)
}

/// Repository storing one entity type in one collection.
///
/// Entities go through `bson::to_document` / `bson::from_document` so keys in
/// stored documents and in query filters share one encoding. Timestamps are
/// the exception: they are stored as BSON dates.
pub struct MongoRepository<T> {
    collection: Collection<Document>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> MongoRepository<T>
where
    T: Record + Serialize + DeserializeOwned,
    T::Key: Serialize,
{
    pub fn new(db: &Database, collection: &str) -> Self {
        Self {
            collection: db.collection(collection),
            _entity: PhantomData,
        }
    }

    fn filter(key: &T::Key) -> Result<Document, RepositoryError> {
        Ok(doc! { KEY_FIELD: bson::to_bson(key)? })
    }

    async fn fetch(&self, filter: Document) -> Result<Option<T>, RepositoryError> {
        match self.collection.find_one(filter).await? {
            Some(document) => Ok(Some(from_stored(document)?)),
            None => Ok(None),
        }
    }

    /// One page of the documents matching `filter`, oldest first.
    async fn find_page(&self, filter: Document, page: Page) -> Result<Vec<T>, RepositoryError> {
        let page = page.normalized();
        let options = FindOptions::builder()
            .sort(doc! { CREATED_FIELD: 1, KEY_FIELD: 1 })
            .skip(page.offset())
            .limit(i64::try_from(page.size).unwrap_or(i64::MAX))
            .build();

        let documents: Vec<Document> = self
            .collection
            .find(filter)
            .with_options(options)
            .await?
            .try_collect()
            .await?;

        documents.into_iter().map(from_stored).collect()
    }
}

#[async_trait]
impl<T> Repository for MongoRepository<T>
where
    T: Record + Serialize + DeserializeOwned,
    T::Key: Serialize,
{
    type Entity = T;
    type Request = T::Request;

    async fn find_by_key(&self, key: KeyOf<Self>) -> Result<Option<T>, RepositoryError> {
        let result = self.fetch(Self::filter(&key)?).await?;
        debug!(
            "DB get from {}: found = {}",
            self.collection.name(),
            result.is_some()
        );
        Ok(result)
    }

    async fn find_all(&self, page: Page) -> Result<Vec<T>, RepositoryError> {
        self.find_page(doc! {}, page).await
    }

    async fn create(&self, request: T::Request) -> Result<T, RepositoryError> {
        let entity = T::from_request(request);
        self.collection
            .insert_one(to_stored(&entity)?)
            .await?;

        debug!("Inserted new document into {}", self.collection.name());
        Ok(entity)
    }

    async fn update(
        &self,
        request: T::Request,
        key: KeyOf<Self>,
    ) -> Result<Option<T>, RepositoryError> {
        let filter = Self::filter(&key)?;
        let Some(mut entity) = self.fetch(filter.clone()).await? else {
            return Ok(None);
        };

        entity.apply(request);
        let result = self
            .collection
            .replace_one(filter, to_stored(&entity)?)
            .await?;

        // Deleted between the read and the write.
        if result.matched_count == 0 {
            return Ok(None);
        }

        debug!("Updated document in {}", self.collection.name());
        Ok(Some(entity))
    }

    async fn delete(&self, key: KeyOf<Self>) -> Result<u64, RepositoryError> {
        let result = self.collection.delete_one(Self::filter(&key)?).await?;
        debug!(
            "Deleted from {}: {}",
            self.collection.name(),
            result.deleted_count
        );
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl Residents for MongoRepository<Person> {
    async fn find_residents(&self, house: Uuid, page: Page) -> Result<Vec<Person>, RepositoryError> {
        let residents = self
            .find_page(doc! { RESIDENCE_FIELD: bson::to_bson(&house)? }, page)
            .await?;
        debug!(
            "DB residents of {} in {}: {}",
            house,
            self.collection.name(),
            residents.len()
        );
        Ok(residents)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::database::models::{House, PersonRequest, Sex, now};

    fn house(uuid: Uuid, create_date: DateTime<Utc>) -> House {
        House {
            uuid,
            area: 1.0,
            country: String::new(),
            city: String::new(),
            street: String::new(),
            number: 1,
            create_date,
        }
    }

    fn person(house: Uuid) -> Person {
        Person::from_request(PersonRequest {
            name: "Anna".to_string(),
            surname: "Kovalenko".to_string(),
            sex: Sex::Female,
            passport_series: "KH".to_string(),
            passport_number: "7654321".to_string(),
            house_of_residence_uuid: house,
        })
    }

    fn stored_date(document: &Document, field: &str) -> bson::DateTime {
        *document.get_datetime(field).unwrap()
    }

    #[test]
    fn test_key_filter_matches_document_encoding() {
        let uuid = Uuid::new_v4();
        let filter = MongoRepository::<House>::filter(&uuid).unwrap();
        let document = to_stored(&house(uuid, now())).unwrap();

        assert_eq!(filter.get(KEY_FIELD), document.get(KEY_FIELD));
        assert!(document.contains_key(CREATED_FIELD));
    }

    #[test]
    fn test_residence_filter_matches_document_encoding() {
        let house = Uuid::new_v4();
        let document = to_stored(&person(house)).unwrap();

        assert_eq!(Some(&bson::to_bson(&house).unwrap()), document.get(RESIDENCE_FIELD));
    }

    #[test]
    fn test_dates_are_stored_as_bson_dates() {
        let person = person(Uuid::new_v4());
        let document = to_stored(&person).unwrap();

        assert_eq!(
            stored_date(&document, "createDate").timestamp_millis(),
            person.create_date.timestamp_millis()
        );
        assert!(matches!(document.get("updateDate"), Some(Bson::DateTime(_))));
        assert_eq!(from_stored::<Person>(document).unwrap(), person);
    }

    #[test]
    fn test_whole_seconds_order_before_fractions() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap();
        let fraction = whole + chrono::Duration::milliseconds(123);

        // As strings "...:05Z" sorts after "...:05.123Z".
        let whole = to_stored(&house(Uuid::new_v4(), whole)).unwrap();
        let fraction = to_stored(&house(Uuid::new_v4(), fraction)).unwrap();

        assert!(stored_date(&whole, CREATED_FIELD) < stored_date(&fraction, CREATED_FIELD));
    }

    #[test]
    fn test_legacy_string_dates_still_decode() {
        let house = house(Uuid::new_v4(), now());
        let document = bson::to_document(&house).unwrap();

        assert!(matches!(document.get(CREATED_FIELD), Some(Bson::String(_))));
        assert_eq!(from_stored::<House>(document).unwrap(), house);
    }

    #[test]
    fn test_out_of_range_date_is_an_error() {
        let mut document = to_stored(&house(Uuid::new_v4(), now())).unwrap();
        document.insert(CREATED_FIELD, bson::DateTime::from_millis(i64::MAX));

        assert!(matches!(
            from_stored::<House>(document),
            Err(RepositoryError::DateOutOfRange(i64::MAX))
        ));
    }
}
