use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type SubscriptionId = String;
pub type FriendId = String;

/// Member id standing for the dashboard owner.
pub const YOU: &str = "You";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub cost: f64,
    pub due_date: NaiveDate,
    pub members: Vec<Member>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub paid: bool,
    pub share: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: FriendId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    // Ordered and may hold the same id twice, see `add_friend_to_subscription`.
    pub subscriptions: Vec<SubscriptionId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Sent,
    Received,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PaymentHistoryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub name: String,
    pub amount: f64,
    pub subscription: String,
    pub date: String,
}

/// Request bodies of the dashboard forms.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub name: String,
    pub cost: f64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFriend {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewPayment {
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub name: String,
    pub amount: f64,
    pub subscription: String,
}

/// A share a friend still owes on one of the subscriptions.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub subscription_id: SubscriptionId,
    pub subscription_name: String,
    pub member_id: String,
    pub member_name: String,
    pub share: f64,
}
