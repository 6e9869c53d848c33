//! Subscriptions, friends and payment history, kept consistent with each other
//! and written back to storage after every change.

use std::sync::{Mutex, MutexGuard};

use chrono::{Local, NaiveDate};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::balance::{recompute_shares, total_shares};
use crate::errors::Result;
use crate::schemas::{
    Friend, Member, NewFriend, NewPayment, NewSubscription, PaymentHistoryItem, PaymentType,
    PendingPayment, Subscription, YOU,
};
use crate::storage::{Storage, StorageKey};

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collections {
    pub subscriptions: Vec<Subscription>,
    pub friends: Vec<Friend>,
    pub payment_history: Vec<PaymentHistoryItem>,
}

impl Collections {
    pub fn add_subscription(&mut self, new: NewSubscription) -> Subscription {
        let subscription = Subscription {
            id: new_id("sub"),
            name: new.name,
            cost: new.cost,
            due_date: new.due_date,
            members: vec![Member {
                id: YOU.to_string(),
                name: YOU.to_string(),
                paid: true,
                share: new.cost,
            }],
            logo: new.logo,
        };
        self.subscriptions.push(subscription.clone());
        subscription
    }

    /// Drops the subscription and every reference friends hold to it.
    pub fn remove_subscription(&mut self, id: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        if self.subscriptions.len() == before {
            return false;
        }
        for friend in self.friends.iter_mut() {
            friend.subscriptions.retain(|subscription_id| subscription_id != id);
        }
        true
    }

    pub fn add_friend(&mut self, new: NewFriend) -> Friend {
        let friend = Friend {
            id: new_id("friend"),
            name: new.name,
            email: new.email,
            wallet_address: new.wallet_address,
            subscriptions: vec![],
        };
        self.friends.push(friend.clone());
        friend
    }

    /// Drops the friend and their memberships. The remaining members keep
    /// their previous shares.
    pub fn remove_friend(&mut self, id: &str) -> bool {
        let before = self.friends.len();
        self.friends.retain(|friend| friend.id != id);
        let mut changed = self.friends.len() != before;
        for subscription in self.subscriptions.iter_mut() {
            let members = subscription.members.len();
            subscription.members.retain(|member| member.id != id);
            changed |= subscription.members.len() != members;
        }
        changed
    }

    /// Adds the friend with `email` to the subscription, creating the friend
    /// from the email's local part when unknown. Shares are split again
    /// across all members.
    pub fn add_friend_to_subscription(
        &mut self,
        subscription_id: &str,
        email: &str,
    ) -> Option<Subscription> {
        let subscription_index = self
            .subscriptions
            .iter()
            .position(|subscription| subscription.id == subscription_id)?;

        let existing = self.friends.iter().position(|friend| friend.email == email);
        let friend_index = match existing {
            Some(index) => index,
            None => {
                let name = email.split('@').next().unwrap_or(email);
                debug!("No friend with email {email}, creating {name}");
                self.add_friend(NewFriend {
                    name: name.to_string(),
                    email: email.to_string(),
                    wallet_address: None,
                });
                self.friends.len() - 1
            }
        };

        let friend = &mut self.friends[friend_index];
        friend.subscriptions.push(subscription_id.to_string());
        let member = Member {
            id: friend.id.clone(),
            name: friend.name.clone(),
            paid: false,
            share: 0.0,
        };

        let subscription = &mut self.subscriptions[subscription_index];
        if !subscription.members.iter().any(|existing| existing.id == member.id) {
            subscription.members.push(member);
            recompute_shares(subscription.cost, &mut subscription.members);
        }
        Some(subscription.clone())
    }

    pub fn remove_friend_from_subscription(
        &mut self,
        subscription_id: &str,
        member_id: &str,
    ) -> bool {
        let mut changed = false;
        for friend in self.friends.iter_mut().filter(|friend| friend.id == member_id) {
            let before = friend.subscriptions.len();
            friend.subscriptions.retain(|id| id != subscription_id);
            changed |= friend.subscriptions.len() != before;
        }

        let Some(subscription) = self
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.id == subscription_id)
        else {
            return changed;
        };
        let before = subscription.members.len();
        subscription.members.retain(|member| member.id != member_id);
        if subscription.members.len() != before {
            recompute_shares(subscription.cost, &mut subscription.members);
            changed = true;
        }
        changed
    }

    /// Marks a member's share as paid and logs it as received.
    pub fn record_payment(
        &mut self,
        subscription_id: &str,
        member_id: &str,
        date: NaiveDate,
    ) -> Option<PaymentHistoryItem> {
        let subscription = self
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.id == subscription_id)?;
        let member = subscription
            .members
            .iter_mut()
            .find(|member| member.id == member_id && !member.paid)?;
        member.paid = true;

        let item = PaymentHistoryItem {
            id: new_id("pay"),
            kind: PaymentType::Received,
            name: member.name.clone(),
            amount: member.share,
            subscription: subscription.name.clone(),
            date: date.to_string(),
        };
        self.payment_history.push(item.clone());
        Some(item)
    }

    pub fn log_payment(&mut self, new: NewPayment, date: NaiveDate) -> PaymentHistoryItem {
        let item = PaymentHistoryItem {
            id: new_id("pay"),
            kind: new.kind,
            name: new.name,
            amount: new.amount,
            subscription: new.subscription,
            date: date.to_string(),
        };
        self.payment_history.push(item.clone());
        item
    }

    pub fn pending_payments(&self) -> Vec<PendingPayment> {
        self.subscriptions
            .iter()
            .flat_map(|subscription| {
                subscription
                    .members
                    .iter()
                    .filter(|member| !member.paid && member.id != YOU)
                    .map(|member| PendingPayment {
                        subscription_id: subscription.id.clone(),
                        subscription_name: subscription.name.clone(),
                        member_id: member.id.clone(),
                        member_name: member.name.clone(),
                        share: member.share,
                    })
            })
            .collect()
    }

    pub fn friend_subscription_names(&self, friend_id: &str) -> Vec<String> {
        let Some(friend) = self.friends.iter().find(|friend| friend.id == friend_id) else {
            return vec![];
        };
        friend
            .subscriptions
            .iter()
            .filter_map(|id| {
                self.subscriptions
                    .iter()
                    .find(|subscription| &subscription.id == id)
                    .map(|subscription| subscription.name.clone())
            })
            .collect()
    }

    fn to_json(&self, key: StorageKey) -> serde_json::Result<String> {
        match key {
            StorageKey::Subscriptions => serde_json::to_string(&self.subscriptions),
            StorageKey::Friends => serde_json::to_string(&self.friends),
            StorageKey::PaymentHistory => serde_json::to_string(&self.payment_history),
        }
    }

    /// The collections a fresh dashboard starts with.
    pub fn demo() -> Self {
        fn member(id: &str, name: &str, paid: bool, share: f64) -> Member {
            Member {
                id: id.to_string(),
                name: name.to_string(),
                paid,
                share,
            }
        }
        fn friend(id: &str, name: &str, email: &str, wallet: &str, subscription: &str) -> Friend {
            Friend {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                wallet_address: Some(wallet.to_string()),
                subscriptions: vec![subscription.to_string()],
            }
        }
        fn payment(
            id: &str,
            kind: PaymentType,
            name: &str,
            amount: f64,
            subscription: &str,
            date: &str,
        ) -> PaymentHistoryItem {
            PaymentHistoryItem {
                id: id.to_string(),
                kind,
                name: name.to_string(),
                amount,
                subscription: subscription.to_string(),
                date: date.to_string(),
            }
        }
        let logo = Some("/placeholder.svg?height=40&width=40".to_string());

        Collections {
            subscriptions: vec![
                Subscription {
                    id: "netflix".to_string(),
                    name: "Netflix".to_string(),
                    cost: 15.99,
                    due_date: NaiveDate::from_ymd_opt(2024, 5, 15).unwrap_or_default(),
                    members: vec![
                        member(YOU, YOU, true, 5.33),
                        member("2", "Alex", true, 5.33),
                        member("3", "Sam", false, 5.33),
                    ],
                    logo: logo.clone(),
                },
                Subscription {
                    id: "spotify".to_string(),
                    name: "Spotify Family".to_string(),
                    cost: 14.99,
                    due_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap_or_default(),
                    members: vec![
                        member(YOU, YOU, true, 3.75),
                        member("4", "Jamie", true, 3.75),
                        member("5", "Taylor", true, 3.75),
                        member("6", "Jordan", false, 3.75),
                    ],
                    logo,
                },
            ],
            friends: vec![
                friend("2", "Alex Johnson", "alex@example.com", "0x123...456", "netflix"),
                friend("3", "Sam Wilson", "sam@example.com", "0x789...012", "netflix"),
                friend("4", "Jamie Lee", "jamie@example.com", "0x345...678", "spotify"),
                friend("5", "Taylor Smith", "taylor@example.com", "0x901...234", "spotify"),
                friend("6", "Jordan Casey", "jordan@example.com", "0x567...890", "spotify"),
            ],
            payment_history: vec![
                payment("pay-1", PaymentType::Sent, "Alex", 5.33, "Netflix", "2024-04-10"),
                payment(
                    "pay-2",
                    PaymentType::Received,
                    "Jamie",
                    3.75,
                    "Spotify Family",
                    "2024-04-05",
                ),
                payment(
                    "pay-3",
                    PaymentType::Received,
                    "Taylor",
                    3.75,
                    "Spotify Family",
                    "2024-04-03",
                ),
            ],
        }
    }
}

/// The shared store handed to the HTTP layer.
pub struct CollectionStore {
    collections: Mutex<Collections>,
    storage: Storage,
    // Held from snapshot to write so saves land in mutation order.
    writer: tokio::sync::Mutex<()>,
}

impl CollectionStore {
    /// Reads every collection from storage. Keys that were never written
    /// start from the demo data when `seed` is set, empty otherwise.
    pub async fn load(storage: Storage, seed: bool) -> Result<Self> {
        let defaults = if seed {
            Collections::demo()
        } else {
            Collections::default()
        };
        let collections = Collections {
            subscriptions: load_or(&storage, StorageKey::Subscriptions, defaults.subscriptions)
                .await?,
            friends: load_or(&storage, StorageKey::Friends, defaults.friends).await?,
            payment_history: load_or(&storage, StorageKey::PaymentHistory, defaults.payment_history)
                .await?,
        };
        info!(
            "Loaded {} subscriptions, {} friends and {} payments",
            collections.subscriptions.len(),
            collections.friends.len(),
            collections.payment_history.len()
        );
        Ok(CollectionStore {
            collections: Mutex::new(collections),
            storage,
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Collections {
        self.lock().clone()
    }

    pub fn pending_payments(&self) -> Vec<PendingPayment> {
        self.lock().pending_payments()
    }

    pub fn friend_subscription_names(&self, friend_id: &str) -> Vec<String> {
        self.lock().friend_subscription_names(friend_id)
    }

    pub async fn add_subscription(&self, new: NewSubscription) -> Subscription {
        let subscription = self.lock().add_subscription(new);
        info!("Added subscription {} ({})", subscription.name, subscription.id);
        self.persist(&[StorageKey::Subscriptions]).await;
        subscription
    }

    pub async fn remove_subscription(&self, id: &str) -> bool {
        let removed = self.lock().remove_subscription(id);
        if removed {
            info!("Removed subscription {id}");
            self.persist(&[StorageKey::Subscriptions, StorageKey::Friends])
                .await;
        }
        removed
    }

    pub async fn add_friend(&self, new: NewFriend) -> Friend {
        let friend = self.lock().add_friend(new);
        info!("Added friend {} ({})", friend.name, friend.id);
        self.persist(&[StorageKey::Friends]).await;
        friend
    }

    pub async fn remove_friend(&self, id: &str) -> bool {
        let removed = self.lock().remove_friend(id);
        if removed {
            info!("Removed friend {id}");
            self.persist(&[StorageKey::Subscriptions, StorageKey::Friends])
                .await;
        }
        removed
    }

    pub async fn add_friend_to_subscription(
        &self,
        subscription_id: &str,
        email: &str,
    ) -> Option<Subscription> {
        let subscription = self
            .lock()
            .add_friend_to_subscription(subscription_id, email);
        if let Some(subscription) = &subscription {
            info!("Added {email} to subscription {subscription_id}");
            debug!(
                "{} split into {} shares totalling {:.2}",
                subscription.cost,
                subscription.members.len(),
                total_shares(&subscription.members)
            );
            self.persist(&[StorageKey::Subscriptions, StorageKey::Friends])
                .await;
        }
        subscription
    }

    pub async fn remove_friend_from_subscription(
        &self,
        subscription_id: &str,
        member_id: &str,
    ) -> bool {
        let removed = self
            .lock()
            .remove_friend_from_subscription(subscription_id, member_id);
        if removed {
            info!("Removed member {member_id} from subscription {subscription_id}");
            self.persist(&[StorageKey::Subscriptions, StorageKey::Friends])
                .await;
        }
        removed
    }

    pub async fn record_payment(
        &self,
        subscription_id: &str,
        member_id: &str,
    ) -> Option<PaymentHistoryItem> {
        let item = self
            .lock()
            .record_payment(subscription_id, member_id, today());
        if let Some(item) = &item {
            info!("{} paid {} for {}", item.name, item.amount, item.subscription);
            self.persist(&[StorageKey::Subscriptions, StorageKey::PaymentHistory])
                .await;
        }
        item
    }

    pub async fn log_payment(&self, new: NewPayment) -> PaymentHistoryItem {
        let item = self.lock().log_payment(new, today());
        self.persist(&[StorageKey::PaymentHistory]).await;
        item
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Best effort: a failed write only loses this change, memory stays ahead.
    async fn persist(&self, keys: &[StorageKey]) {
        let _writer = self.writer.lock().await;
        let documents: Vec<_> = {
            let collections = self.lock();
            keys.iter()
                .map(|key| (*key, collections.to_json(*key)))
                .collect()
        };
        for (key, document) in documents {
            let written = match document {
                Ok(json) => self.storage.save(key, json).await,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = written {
                warn!("Failed to persist {key}: {err}");
            }
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn load_or<T: DeserializeOwned>(
    storage: &Storage,
    key: StorageKey,
    default: Vec<T>,
) -> Result<Vec<T>> {
    match storage.load(key).await? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn netflix(collections: &mut Collections) -> String {
        collections
            .add_subscription(NewSubscription {
                name: "Netflix".to_string(),
                cost: 15.99,
                due_date: NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
                logo: None,
            })
            .id
    }

    fn subscription<'a>(collections: &'a Collections, id: &str) -> &'a Subscription {
        collections
            .subscriptions
            .iter()
            .find(|subscription| subscription.id == id)
            .unwrap()
    }

    fn friend_by_email<'a>(collections: &'a Collections, email: &str) -> &'a Friend {
        collections
            .friends
            .iter()
            .find(|friend| friend.email == email)
            .unwrap()
    }

    fn shares(collections: &Collections, id: &str) -> Vec<f64> {
        subscription(collections, id)
            .members
            .iter()
            .map(|member| member.share)
            .collect()
    }

    #[test]
    fn new_subscription_belongs_to_you() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        let created = subscription(&collections, &id);
        assert!(id.starts_with("sub-"));
        assert_eq!(created.members.len(), 1);
        assert_eq!(created.members[0].id, YOU);
        assert!(created.members[0].paid);
        assert_eq!(created.members[0].share, 15.99);
    }

    #[test]
    fn netflix_split_three_then_two_ways() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        collections.add_friend_to_subscription(&id, "a@x.com").unwrap();
        collections.add_friend_to_subscription(&id, "b@x.com").unwrap();
        assert_eq!(shares(&collections, &id), vec![5.33, 5.33, 5.33]);

        let a = friend_by_email(&collections, "a@x.com").clone();
        assert_eq!(a.name, "a");
        assert_eq!(a.subscriptions, vec![id.clone()]);

        assert!(collections.remove_friend_from_subscription(&id, &a.id));
        assert_eq!(shares(&collections, &id), vec![8.0, 8.0]);
        assert!(friend_by_email(&collections, "a@x.com").subscriptions.is_empty());
    }

    #[test]
    fn membership_changes_keep_shares_close_to_cost() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        for n in 0..6 {
            collections
                .add_friend_to_subscription(&id, &format!("f{n}@x.com"))
                .unwrap();
            let current = subscription(&collections, &id);
            let drift = (total_shares(&current.members) - current.cost).abs();
            assert!(drift <= 0.01 * current.members.len() as f64 + 1e-9);
        }
    }

    #[test]
    fn existing_email_reuses_friend_but_appends_subscription_again() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        collections.add_friend(NewFriend {
            name: "Alex Johnson".to_string(),
            email: "alex@example.com".to_string(),
            wallet_address: Some("0x123...456".to_string()),
        });

        collections
            .add_friend_to_subscription(&id, "alex@example.com")
            .unwrap();
        collections
            .add_friend_to_subscription(&id, "alex@example.com")
            .unwrap();

        assert_eq!(collections.friends.len(), 1);
        let alex = friend_by_email(&collections, "alex@example.com");
        assert_eq!(alex.subscriptions, vec![id.clone(), id.clone()]);
        let members = &subscription(&collections, &id).members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].name, "Alex Johnson");
        assert!(!members[1].paid);
    }

    #[test]
    fn unknown_subscription_is_a_no_op() {
        let mut collections = Collections::default();
        assert!(collections
            .add_friend_to_subscription("missing", "a@x.com")
            .is_none());
        assert!(collections.friends.is_empty());
        assert!(!collections.remove_friend_from_subscription("missing", "anyone"));
        assert!(!collections.remove_subscription("missing"));
        assert!(!collections.remove_friend("missing"));
    }

    #[test]
    fn removing_friend_drops_membership_without_resplitting() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        collections.add_friend_to_subscription(&id, "a@x.com").unwrap();
        collections.add_friend_to_subscription(&id, "b@x.com").unwrap();
        let a = friend_by_email(&collections, "a@x.com").id.clone();

        assert!(collections.remove_friend(&a));

        let members = &subscription(&collections, &id).members;
        assert!(members.iter().all(|member| member.id != a));
        assert_eq!(shares(&collections, &id), vec![5.33, 5.33]);
    }

    #[test]
    fn removing_subscription_cascades_to_friends() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        collections.add_friend_to_subscription(&id, "a@x.com").unwrap();
        collections.add_friend_to_subscription(&id, "a@x.com").unwrap();

        assert!(collections.remove_subscription(&id));
        assert!(collections.subscriptions.is_empty());
        assert!(friend_by_email(&collections, "a@x.com").subscriptions.is_empty());
    }

    #[test]
    fn removing_last_member_leaves_no_nan() {
        let mut collections = Collections::default();
        let id = netflix(&mut collections);
        assert!(collections.remove_friend_from_subscription(&id, YOU));
        assert!(subscription(&collections, &id).members.is_empty());

        collections.add_friend_to_subscription(&id, "a@x.com").unwrap();
        assert_eq!(shares(&collections, &id), vec![15.99]);
        assert!(collections
            .subscriptions
            .iter()
            .flat_map(|subscription| &subscription.members)
            .all(|member| member.share.is_finite()));
    }

    #[test]
    fn pending_payments_skip_you_and_paid_members() {
        let collections = Collections::demo();
        let pending = collections.pending_payments();
        let names: Vec<_> = pending.iter().map(|p| p.member_name.as_str()).collect();
        assert_eq!(names, vec!["Sam", "Jordan"]);
        assert_eq!(pending[0].subscription_name, "Netflix");
        assert_eq!(pending[1].share, 3.75);
    }

    #[test]
    fn recording_a_payment_marks_paid_and_logs_it_once() {
        let mut collections = Collections::demo();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let history = collections.payment_history.len();

        let item = collections.record_payment("netflix", "3", date).unwrap();
        assert_eq!(item.kind, PaymentType::Received);
        assert_eq!(item.name, "Sam");
        assert_eq!(item.amount, 5.33);
        assert_eq!(item.subscription, "Netflix");
        assert_eq!(item.date, "2024-05-01");

        assert!(collections.record_payment("netflix", "3", date).is_none());
        assert_eq!(collections.payment_history.len(), history + 1);
        assert!(collections
            .pending_payments()
            .iter()
            .all(|pending| pending.member_id != "3"));
    }

    #[test]
    fn friend_subscription_names_skip_dangling_ids() {
        let mut collections = Collections::demo();
        collections.friends[0].subscriptions.push("gone".to_string());
        assert_eq!(collections.friend_subscription_names("2"), vec!["Netflix"]);
        assert!(collections.friend_subscription_names("nobody").is_empty());
    }

    #[tokio::test]
    async fn store_seeds_and_persists_every_touched_collection() {
        let store = CollectionStore::load(Storage::memory(), true).await.unwrap();
        assert_eq!(store.snapshot(), Collections::demo());

        let subscription = store
            .add_subscription(NewSubscription {
                name: "Disney+".to_string(),
                cost: 9.99,
                due_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                logo: None,
            })
            .await;
        store
            .add_friend_to_subscription(&subscription.id, "new@x.com")
            .await
            .unwrap();
        store
            .log_payment(NewPayment {
                kind: PaymentType::Sent,
                name: "Alex".to_string(),
                amount: 5.33,
                subscription: "Netflix".to_string(),
            })
            .await;

        let snapshot = store.snapshot();
        let reloaded = CollectionStore::load(store.storage, false).await.unwrap();
        assert_eq!(reloaded.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn store_without_seed_starts_empty() {
        let store = CollectionStore::load(Storage::memory(), false).await.unwrap();
        assert_eq!(store.snapshot(), Collections::default());
        assert!(!store.remove_friend("2").await);
    }

    #[tokio::test]
    async fn malformed_storage_is_an_error() {
        let storage = Storage::memory();
        storage
            .save(StorageKey::Friends, "{not json".to_string())
            .await
            .unwrap();
        assert!(CollectionStore::load(storage, true).await.is_err());
    }

    #[tokio::test]
    async fn member_removal_miss_writes_nothing() {
        let store = CollectionStore::load(Storage::memory(), false).await.unwrap();
        assert!(!store.remove_friend_from_subscription("missing", "x").await);
        assert!(!store.remove_friend_from_subscription("missing", "x").await);
        for key in [StorageKey::Subscriptions, StorageKey::Friends] {
            assert_eq!(store.storage.load(key).await.unwrap(), None);
        }
    }

    fn worker_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    async fn file_store(dir: &std::path::Path) -> CollectionStore {
        let storage = Storage::file(dir).await.unwrap();
        CollectionStore::load(storage, false).await.unwrap()
    }

    // Each thread drives its own runtime, the way actix-web workers share `web::Data`.
    #[test]
    fn concurrent_workers_leave_a_loadable_latest_state() {
        let dir = std::env::temp_dir().join(format!("subsplit-{}", uuid::Uuid::new_v4()));
        let store = std::sync::Arc::new(worker_runtime().block_on(file_store(&dir)));

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    worker_runtime().block_on(async {
                        for n in 0..3 {
                            store
                                .add_friend(NewFriend {
                                    name: format!("Friend {worker}-{n}"),
                                    email: format!("friend-{worker}-{n}@x.com"),
                                    wallet_address: None,
                                })
                                .await;
                        }
                    })
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let reloaded = worker_runtime().block_on(file_store(&dir));
        assert_eq!(reloaded.snapshot().friends.len(), 24);
        assert_eq!(reloaded.snapshot(), store.snapshot());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failed_writes_keep_the_change_in_memory() {
        let dir = std::env::temp_dir().join(format!("subsplit-{}", uuid::Uuid::new_v4()));
        let storage = Storage::file(&dir).await.unwrap();
        let store = CollectionStore::load(storage, false).await.unwrap();
        tokio::fs::remove_dir_all(&dir).await.unwrap();

        let friend = store
            .add_friend(NewFriend {
                name: "Sam".to_string(),
                email: "sam@example.com".to_string(),
                wallet_address: None,
            })
            .await;
        assert_eq!(store.snapshot().friends, vec![friend]);
    }
}
