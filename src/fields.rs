use log::{debug, info};
use std::sync::Arc;

use crate::db::Database;
use crate::error::{NotFound, StoreError, StoreResult};
use crate::models::{Applied, Field, Refresh};

const SELECT_FIELDS: &str =
    "SELECT name, COALESCE(type, '') AS category, price AS price_per_hour FROM Field ORDER BY name";
const SELECT_FIELD_BY_NAME: &str =
    "SELECT name, COALESCE(type, '') AS category, price AS price_per_hour FROM Field WHERE name = ?";

const DELETE_UNREFERENCED_FIELD: &str =
    "DELETE FROM Field WHERE name = ? AND NOT EXISTS (SELECT 1 FROM Booking WHERE field_name = ?)";

/// Owns the `Field` table.
pub struct FieldStore {
    db: Database,
}

impl FieldStore {
    pub fn from(db: Database) -> Arc<Self> {
        Arc::new(Self { db })
    }

    pub async fn create_field(
        &self,
        name: &str,
        category: &str,
        price_per_hour: f64,
    ) -> StoreResult<Applied<()>> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("field name must not be empty".into()));
        }
        // names are looked up verbatim
        if name.trim() != name {
            return Err(StoreError::InvalidInput(format!(
                "field name {name:?} has leading or trailing whitespace"
            )));
        }
        if !price_per_hour.is_finite() || price_per_hour < 0.0 {
            return Err(StoreError::InvalidInput(format!(
                "price per hour must be a non-negative number, got {price_per_hour}"
            )));
        }

        sqlx::query("INSERT INTO Field (name, type, price) VALUES (?, ?, ?)")
            .bind(name)
            .bind(category)
            .bind(price_per_hour)
            .execute(&self.db.pool)
            .await
            .map_err(|e| {
                if Database::is_duplicate_key(&e) {
                    StoreError::DuplicateKey {
                        name: name.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;

        info!("Added field {name:?} ({category}, {price_per_hour}/hour)");
        Ok(Applied::new((), Refresh::Fields))
    }

    pub async fn list_fields(&self) -> StoreResult<Vec<Field>> {
        let fields = sqlx::query_as::<_, Field>(SELECT_FIELDS)
            .fetch_all(&self.db.pool)
            .await?;
        debug!("Listed {} field(s)", fields.len());
        Ok(fields)
    }

    pub async fn get_field_by_name(&self, name: &str) -> StoreResult<Option<Field>> {
        let field = sqlx::query_as::<_, Field>(SELECT_FIELD_BY_NAME)
            .bind(name)
            .fetch_optional(&self.db.pool)
            .await?;
        debug!("Lookup of field {name:?}: found={}", field.is_some());
        Ok(field)
    }

    /// Deletes a field that no booking references.
    ///
    /// A referenced field is left in place and reported as
    /// [`StoreError::ReferentialConflict`]; the bookings must be deleted first.
    pub async fn delete_field(&self, name: &str) -> StoreResult<Applied<()>> {
        let mut tx = self.db.pool.begin().await?;

        // write first: the transaction holds the write lock from here on
        let deleted = sqlx::query(DELETE_UNREFERENCED_FIELD)
            .bind(name)
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT name FROM Field WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_none() {
                return Err(StoreError::NotFound(NotFound::Field(name.to_string())));
            }

            let bookings: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM Booking WHERE field_name = ?")
                    .bind(name)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(StoreError::ReferentialConflict {
                name: name.to_string(),
                bookings,
            });
        }
        tx.commit().await?;

        info!("Deleted field {name:?}");
        Ok(Applied::new((), Refresh::Fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_field, arb_padded_name, test_prop};
    use proptest::proptest;

    #[tokio::test]
    async fn test_create_and_get_field() {
        let fields = FieldStore::from(Database::for_test().await);

        let applied = fields
            .create_field("Court A", "Futsal", 100000.0)
            .await
            .expect("Field creation should succeed");
        assert_eq!(applied.refresh, Refresh::Fields);

        let field = fields
            .get_field_by_name("Court A")
            .await
            .unwrap()
            .expect("Field should exist");
        assert_eq!(
            field,
            Field {
                name: "Court A".to_string(),
                category: "Futsal".to_string(),
                price_per_hour: 100000.0,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_field_is_none() {
        let fields = FieldStore::from(Database::for_test().await);
        assert!(fields.get_field_by_name("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_keeps_original_row() {
        let fields = FieldStore::from(Database::for_test().await);
        fields.create_field("Court A", "Futsal", 100000.0).await.unwrap();

        let err = fields
            .create_field("Court A", "Badminton", 5.0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref name } if name == "Court A"));

        let field = fields.get_field_by_name("Court A").await.unwrap().unwrap();
        assert_eq!(field.category, "Futsal");
        assert_eq!(field.price_per_hour, 100000.0);
        assert_eq!(fields.list_fields().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let fields = FieldStore::from(Database::for_test().await);

        for price in [-1.0, f64::NAN, f64::INFINITY] {
            let err = fields.create_field("Court A", "Futsal", price).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)), "price {price} accepted");
        }
        let err = fields.create_field("   ", "Futsal", 1.0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));

        assert!(fields.list_fields().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_padded_name_is_rejected_not_trimmed() {
        let fields = FieldStore::from(Database::for_test().await);

        for name in [" Court A", "Court A ", "\tCourt A\n"] {
            let err = fields.create_field(name, "Futsal", 1.0).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)), "{name:?} accepted");
        }
        assert!(fields.get_field_by_name("Court A").await.unwrap().is_none());
        assert!(fields.list_fields().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_price_surfaces_as_database_error() {
        let db = Database::for_test().await;
        let fields = FieldStore::from(db.clone());
        sqlx::query("INSERT INTO Field (name, type, price) VALUES ('Court A', 'Futsal', NULL)")
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(matches!(fields.list_fields().await, Err(StoreError::Database(_))));
        assert!(matches!(
            fields.get_field_by_name("Court A").await,
            Err(StoreError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_price_is_allowed() {
        let fields = FieldStore::from(Database::for_test().await);
        fields.create_field("Free court", "Basket", 0.0).await.unwrap();
        assert!(fields.get_field_by_name("Free court").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_fields_is_ordered_by_name() {
        let fields = FieldStore::from(Database::for_test().await);
        for name in ["Court C", "Court A", "Court B"] {
            fields.create_field(name, "Futsal", 1.0).await.unwrap();
        }
        let names: Vec<String> = fields
            .list_fields()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Court A", "Court B", "Court C"]);
    }

    #[tokio::test]
    async fn test_delete_field() {
        let fields = FieldStore::from(Database::for_test().await);
        fields.create_field("Court A", "Futsal", 1.0).await.unwrap();

        let applied = fields.delete_field("Court A").await.expect("Delete should succeed");
        assert_eq!(applied.refresh, Refresh::Fields);
        assert!(fields.get_field_by_name("Court A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_field_leaves_storage_unchanged() {
        let fields = FieldStore::from(Database::for_test().await);
        fields.create_field("Court A", "Futsal", 1.0).await.unwrap();

        let err = fields.delete_field("Court B").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(NotFound::Field(ref n)) if n == "Court B"));
        assert_eq!(fields.list_fields().await.unwrap().len(), 1);
    }

    async fn prop_create_then_get_returns_same_field(db: Database, field: Field) {
        let fields = FieldStore::from(db);
        fields
            .create_field(&field.name, &field.category, field.price_per_hour)
            .await
            .expect("Valid field should be accepted");

        let stored = fields
            .get_field_by_name(&field.name)
            .await
            .unwrap()
            .expect("Created field should be found");
        assert_eq!(stored, field);
    }

    async fn prop_padded_name_stores_nothing(db: Database, name: String) {
        let fields = FieldStore::from(db);
        let result = fields.create_field(&name, "Futsal", 1.0).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))), "{name:?} accepted");
        assert!(fields.get_field_by_name(&name).await.unwrap().is_none());
        assert!(fields.list_fields().await.unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn create_then_get_returns_same_field(field in arb_field()) {
            test_prop(|db| async move {
                prop_create_then_get_returns_same_field(db, field).await;
            });
        }

        #[test]
        fn padded_name_stores_nothing(name in arb_padded_name()) {
            test_prop(|db| async move {
                prop_padded_name_stores_nothing(db, name).await;
            });
        }
    }
}
