//! MongoDB-backed account gateway
//!
//! Records live in the `accounts` collection:
//! `{ _id: ObjectId, streamToken, isActive, isLive, viewers }`.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};

use super::{AccountError, AccountGateway, AccountId};

const ACCOUNTS_COLLECTION: &str = "accounts";

/// Account gateway over a MongoDB database
#[derive(Clone)]
pub struct MongoAccountGateway {
    accounts: Collection<Document>,
}

impl MongoAccountGateway {
    /// Connect and verify the server answers
    ///
    /// Fails with [`AccountError::Unavailable`] if the database cannot be
    /// reached.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AccountError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;
        let db = client.database(database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;

        tracing::info!(database = database, "Connected to account store");

        Ok(Self {
            accounts: db.collection(ACCOUNTS_COLLECTION),
        })
    }

    async fn update(&self, account: &AccountId, update: Document) -> Result<(), AccountError> {
        let id = object_id(account)?;
        self.accounts
            .update_one(doc! { "_id": id }, update)
            .await
            .map_err(|e| AccountError::Query(e.to_string()))?;
        Ok(())
    }
}

fn object_id(account: &AccountId) -> Result<ObjectId, AccountError> {
    ObjectId::parse_str(account.as_str()).map_err(|e| AccountError::Query(e.to_string()))
}

impl AccountGateway for MongoAccountGateway {
    async fn authenticate(&self, account: &AccountId, token: &str) -> Result<bool, AccountError> {
        let id = object_id(account)?;
        let found = self
            .accounts
            .find_one(doc! { "_id": id, "streamToken": token, "isActive": true })
            .await
            .map_err(|e| AccountError::Query(e.to_string()))?;
        Ok(found.is_some())
    }

    async fn set_live(&self, account: &AccountId, live: bool) -> Result<(), AccountError> {
        self.update(account, doc! { "$set": { "isLive": live } }).await
    }

    async fn add_viewers(&self, account: &AccountId, delta: i64) -> Result<(), AccountError> {
        self.update(account, doc! { "$inc": { "viewers": delta } }).await
    }

    async fn reset_viewers(&self, account: &AccountId) -> Result<(), AccountError> {
        self.update(account, doc! { "$set": { "viewers": 0 } }).await
    }
}

impl std::fmt::Debug for MongoAccountGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoAccountGateway")
            .field("collection", &self.accounts.name())
            .finish()
    }
}
