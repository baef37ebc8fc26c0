use uuid::Uuid;

use crate::domain::account::Role;

// ============================================================================
// Access Control - Who may invoke which lifecycle operation
// ============================================================================
//
// Identity comes from outside (session/token handling is not part of this
// crate). The lifecycle manager asks an AccessPolicy before doing any work
// and turns a denial into LifecycleError::Forbidden.
//
// Default table (RoleGuard):
// - anyone         : CreatePublicOrder, TrackByCode
// - ADMIN          : CreateOrder, UpdateOrder, AssignCourier, DeleteOrder,
//                    DeleteAllOrders, FilterOrders, ListOrders, FindOrder,
//                    AdminStats
// - ADMIN, COURIER : TransitionStatus
// - ADMIN, USER    : OrdersForCustomer, StatusHistory, TrackOwnOrder
//
// ============================================================================

/// Identity supplied with every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Account { id: Uuid, role: Role },
}

impl Caller {
    pub fn admin(id: Uuid) -> Self {
        Caller::Account { id, role: Role::Admin }
    }

    pub fn courier(id: Uuid) -> Self {
        Caller::Account { id, role: Role::Courier }
    }

    pub fn customer(id: Uuid) -> Self {
        Caller::Account { id, role: Role::User }
    }

    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            Caller::Anonymous => None,
            Caller::Account { id, .. } => Some(*id),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Caller::Anonymous => None,
            Caller::Account { role, .. } => Some(*role),
        }
    }

    /// Value written to `updated_by` in status history.
    pub fn actor(&self) -> String {
        match self {
            Caller::Anonymous => crate::domain::order::SYSTEM_ACTOR.to_string(),
            Caller::Account { id, .. } => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrder,
    CreatePublicOrder,
    UpdateOrder,
    TransitionStatus,
    AssignCourier,
    DeleteOrder,
    DeleteAllOrders,
    FilterOrders,
    ListOrders,
    FindOrder,
    OrdersForCustomer,
    StatusHistory,
    AdminStats,
    TrackByCode,
    TrackOwnOrder,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateOrder => "create_order",
            Operation::CreatePublicOrder => "create_public_order",
            Operation::UpdateOrder => "update_order",
            Operation::TransitionStatus => "transition_status",
            Operation::AssignCourier => "assign_courier",
            Operation::DeleteOrder => "delete_order",
            Operation::DeleteAllOrders => "delete_all_orders",
            Operation::FilterOrders => "filter_orders",
            Operation::ListOrders => "list_orders",
            Operation::FindOrder => "find_order",
            Operation::OrdersForCustomer => "orders_for_customer",
            Operation::StatusHistory => "status_history",
            Operation::AdminStats => "admin_stats",
            Operation::TrackByCode => "track_by_code",
            Operation::TrackOwnOrder => "track_own_order",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("Authentication required for {0}")]
    Unauthenticated(Operation),

    #[error("Role {role} may not perform {operation}")]
    Role { role: Role, operation: Operation },

    #[error("{0} is limited to the caller's own orders")]
    NotOwner(Operation),
}

pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, caller: &Caller, operation: Operation) -> Result<(), AccessDenied>;
}

/// Role table matching the HTTP surface of the courier service.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleGuard;

impl RoleGuard {
    fn allowed_roles(operation: Operation) -> Option<&'static [Role]> {
        match operation {
            Operation::CreatePublicOrder | Operation::TrackByCode => None,
            Operation::TransitionStatus => Some(&[Role::Admin, Role::Courier]),
            Operation::OrdersForCustomer | Operation::StatusHistory | Operation::TrackOwnOrder => {
                Some(&[Role::Admin, Role::User])
            }
            Operation::CreateOrder
            | Operation::UpdateOrder
            | Operation::AssignCourier
            | Operation::DeleteOrder
            | Operation::DeleteAllOrders
            | Operation::FilterOrders
            | Operation::ListOrders
            | Operation::FindOrder
            | Operation::AdminStats => Some(&[Role::Admin]),
        }
    }
}

impl AccessPolicy for RoleGuard {
    fn authorize(&self, caller: &Caller, operation: Operation) -> Result<(), AccessDenied> {
        let Some(roles) = Self::allowed_roles(operation) else {
            return Ok(());
        };
        match caller.role() {
            None => Err(AccessDenied::Unauthenticated(operation)),
            Some(role) if roles.contains(&role) => Ok(()),
            Some(role) => Err(AccessDenied::Role { role, operation }),
        }
    }
}
