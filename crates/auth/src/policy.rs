//! Role → permission policy.

use crate::{Permission, Role};

pub const ITEMS_READ: Permission = Permission::from_static("items.read");
pub const ITEMS_WRITE: Permission = Permission::from_static("items.write");
pub const WAREHOUSES_READ: Permission = Permission::from_static("warehouses.read");
pub const WAREHOUSES_WRITE: Permission = Permission::from_static("warehouses.write");
pub const INVENTORY_READ: Permission = Permission::from_static("inventory.read");
pub const TRANSACTIONS_READ: Permission = Permission::from_static("transactions.read");
pub const TRANSACTIONS_WRITE: Permission = Permission::from_static("transactions.write");
pub const TRANSFERS_READ: Permission = Permission::from_static("transfers.read");
pub const TRANSFERS_WRITE: Permission = Permission::from_static("transfers.write");
pub const REQUESTS_READ: Permission = Permission::from_static("requests.read");
pub const REQUESTS_WRITE: Permission = Permission::from_static("requests.write");
pub const REQUESTS_APPROVE: Permission = Permission::from_static("requests.approve");
pub const SALES_READ: Permission = Permission::from_static("sales.read");
pub const SALES_WRITE: Permission = Permission::from_static("sales.write");
pub const REPORTS_READ: Permission = Permission::from_static("reports.read");
pub const NOTIFICATIONS_READ: Permission = Permission::from_static("notifications.read");
pub const SETTINGS_READ: Permission = Permission::from_static("settings.read");
pub const SETTINGS_WRITE: Permission = Permission::from_static("settings.write");

const MANAGER_PERMISSIONS: &[Permission] = &[
    ITEMS_READ,
    ITEMS_WRITE,
    WAREHOUSES_READ,
    INVENTORY_READ,
    TRANSACTIONS_READ,
    TRANSACTIONS_WRITE,
    TRANSFERS_READ,
    TRANSFERS_WRITE,
    REQUESTS_READ,
    REQUESTS_WRITE,
    REQUESTS_APPROVE,
    SALES_READ,
    SALES_WRITE,
    REPORTS_READ,
    NOTIFICATIONS_READ,
    SETTINGS_READ,
];

const USER_PERMISSIONS: &[Permission] = &[
    ITEMS_READ,
    WAREHOUSES_READ,
    INVENTORY_READ,
    TRANSFERS_READ,
    REQUESTS_READ,
    REQUESTS_WRITE,
    SALES_READ,
    NOTIFICATIONS_READ,
];

/// Effective permissions for a set of roles.
///
/// `admin` maps to the wildcard; unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::ALL];
    }

    let mut perms: Vec<Permission> = Vec::new();
    for role in roles {
        let granted: &[Permission] = match role.as_str() {
            "manager" => MANAGER_PERMISSIONS,
            "user" => USER_PERMISSIONS,
            _ => &[],
        };
        for p in granted {
            if !perms.contains(p) {
                perms.push(p.clone());
            }
        }
    }
    perms
}
