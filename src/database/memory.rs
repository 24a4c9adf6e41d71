//! In-memory repository backed by `DashMap`.
//!
//! Used when running without MongoDB and as the collaborator in tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::models::{Person, Record};
use super::repository::{KeyOf, Page, Repository, RepositoryError, Residents};
use crate::cache::Identifiable;

/// Repository keeping every entity in a concurrent map.
///
/// Each row remembers its insertion sequence so listing order is stable.
pub struct MemoryRepository<T: Record> {
    rows: DashMap<T::Key, (u64, T)>,
    sequence: AtomicU64,
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Number of stored entities.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One page of the rows accepted by `keep`, in insertion order.
    fn find_page<F>(&self, page: Page, keep: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let page = page.normalized();
        let mut rows: Vec<(u64, T)> = self
            .rows
            .iter()
            .filter(|row| keep(&row.1))
            .map(|row| (row.0, row.1.clone()))
            .collect();
        rows.sort_by_key(|(sequence, _)| *sequence);

        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(page.size).unwrap_or(usize::MAX);
        rows.into_iter().skip(skip).take(take).map(|(_, t)| t).collect()
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository for MemoryRepository<T> {
    type Entity = T;
    type Request = T::Request;

    async fn find_by_key(&self, key: KeyOf<Self>) -> Result<Option<T>, RepositoryError> {
        Ok(self.rows.get(&key).map(|row| row.1.clone()))
    }

    async fn find_all(&self, page: Page) -> Result<Vec<T>, RepositoryError> {
        Ok(self.find_page(page, |_| true))
    }

    async fn create(&self, request: T::Request) -> Result<T, RepositoryError> {
        let entity = T::from_request(request);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(entity.key(), (sequence, entity.clone()));
        debug!("Stored new entity in memory ({} rows)", self.rows.len());
        Ok(entity)
    }

    async fn update(
        &self,
        request: T::Request,
        key: KeyOf<Self>,
    ) -> Result<Option<T>, RepositoryError> {
        Ok(self.rows.get_mut(&key).map(|mut row| {
            row.1.apply(request);
            row.1.clone()
        }))
    }

    async fn delete(&self, key: KeyOf<Self>) -> Result<u64, RepositoryError> {
        Ok(u64::from(self.rows.remove(&key).is_some()))
    }
}

#[async_trait]
impl Residents for MemoryRepository<Person> {
    async fn find_residents(&self, house: Uuid, page: Page) -> Result<Vec<Person>, RepositoryError> {
        Ok(self.find_page(page, |person| person.house_of_residence_uuid == house))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{House, HouseRequest, PersonRequest, Sex};

    fn request(number: i32) -> HouseRequest {
        HouseRequest {
            area: 80.0,
            country: "Poland".to_string(),
            city: "Warsaw".to_string(),
            street: "Marszalkowska".to_string(),
            number,
        }
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let repo = MemoryRepository::<House>::new();

        let created = repo.create(request(1)).await.unwrap();
        assert_eq!(repo.find_by_key(created.uuid).await.unwrap(), Some(created.clone()));

        let updated = repo.update(request(2), created.uuid).await.unwrap().unwrap();
        assert_eq!(updated.number, 2);
        assert_eq!(updated.uuid, created.uuid);

        assert_eq!(repo.delete(created.uuid).await.unwrap(), 1);
        assert_eq!(repo.delete(created.uuid).await.unwrap(), 0);
        assert!(repo.find_by_key(created.uuid).await.unwrap().is_none());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_none() {
        let repo = MemoryRepository::<House>::new();
        assert!(repo.update(request(1), Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_all_pages_in_insertion_order() {
        let repo = MemoryRepository::<House>::new();
        for number in 0..5 {
            repo.create(request(number)).await.unwrap();
        }

        let first = repo.find_all(Page::new(0, 2)).await.unwrap();
        let last = repo.find_all(Page::new(2, 2)).await.unwrap();

        assert_eq!(first.iter().map(|h| h.number).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(last.iter().map(|h| h.number).collect::<Vec<_>>(), vec![4]);
        assert_eq!(repo.len(), 5);
    }

    #[tokio::test]
    async fn test_find_residents_filters_by_house() {
        let repo = MemoryRepository::<Person>::new();
        let (home, elsewhere) = (Uuid::new_v4(), Uuid::new_v4());
        let resident = |name: &str, house: Uuid| PersonRequest {
            name: name.to_string(),
            surname: "Novak".to_string(),
            sex: Sex::Male,
            passport_series: "PL".to_string(),
            passport_number: "1000001".to_string(),
            house_of_residence_uuid: house,
        };

        for name in ["Jan", "Piotr", "Adam"] {
            repo.create(resident(name, home)).await.unwrap();
        }
        repo.create(resident("Marek", elsewhere)).await.unwrap();

        let names = |people: Vec<Person>| people.into_iter().map(|p| p.name).collect::<Vec<_>>();
        assert_eq!(
            names(repo.find_residents(home, Page::default()).await.unwrap()),
            vec!["Jan", "Piotr", "Adam"]
        );
        assert_eq!(
            names(repo.find_residents(home, Page::new(1, 2)).await.unwrap()),
            vec!["Adam"]
        );
        assert!(repo
            .find_residents(Uuid::new_v4(), Page::default())
            .await
            .unwrap()
            .is_empty());
    }
}
