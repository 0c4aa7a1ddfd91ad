use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Booking, UserId};

/// Closed set of capabilities an identity can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    SalonOwner,
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "salon_owner" => Ok(Role::SalonOwner),
            "superadmin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The caller of an operation, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn can_book(&self) -> bool {
        self.role == Role::Customer
    }

    /// Cancellation is open to the booking's customer and the salon's owner.
    pub fn may_cancel(&self, booking: &Booking, salon_owner: Option<UserId>) -> bool {
        self.id == booking.customer_id || salon_owner == Some(self.id)
    }

    pub fn may_view(&self, booking: &Booking, salon_owner: Option<UserId>) -> bool {
        self.role == Role::SuperAdmin || self.may_cancel(booking, salon_owner)
    }

    /// Owner-side actions such as marking a booking completed.
    pub fn may_manage(&self, salon_owner: Option<UserId>) -> bool {
        match self.role {
            Role::SuperAdmin => true,
            Role::SalonOwner => salon_owner == Some(self.id),
            Role::Customer => false,
        }
    }
}
