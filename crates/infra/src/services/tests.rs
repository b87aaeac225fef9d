use std::collections::HashMap;
use std::future::ready;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal_macros::dec;

use warehub_auth::{Principal, Role};
use warehub_core::{TenantId, UserId};
use warehub_inventory::{
    Item, MovementFilter, NewItem, NewWarehouse, StockBalance, TransactionKind, TransactionStatus,
    ValuationMethod, Warehouse, WarehouseId,
};
use warehub_requests::{NewRequest, NewRequestItem, RequestStatus};
use warehub_sales::{NewOrderLine, NewSalesOrder, SalesOrderStatus};
use warehub_transfers::{
    LineQuantity, NewTransfer, NewTransferLine, RejectedGoodsStatus, TransferStatus,
    TransitionRequest,
};

use super::*;
use crate::notifications::Notification;
use crate::settings::SettingsPatch;
use crate::store::InMemoryStore;

#[derive(Default)]
struct CollectingSink {
    seen: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    fn kinds(&self) -> Vec<NotificationKind> {
        self.seen
            .lock()
            .map(|seen| seen.iter().map(|n| n.kind).collect())
            .unwrap_or_default()
    }
}

impl NotificationSink for CollectingSink {
    fn publish(&self, _tenant_id: TenantId, notification: &Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification.clone());
        }
    }
}

struct Fixture {
    services: Services,
    sink: Arc<CollectingSink>,
    tenant: TenantId,
    admin: Principal,
}

impl Fixture {
    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    fn with_store(store: Arc<dyn Store>) -> Self {
        let sink = Arc::new(CollectingSink::default());
        let services = Services::new(store, sink.clone());
        let tenant = TenantId::new();
        let admin = Principal::from_roles(UserId::new(), tenant, vec![Role::ADMIN]);
        Self {
            services,
            sink,
            tenant,
            admin,
        }
    }

    fn principal(&self, role: Role) -> Principal {
        Principal::from_roles(UserId::new(), self.tenant, vec![role])
    }

    async fn item(&self, sku: &str, min: i64) -> Item {
        self.services
            .create_item(
                &self.admin,
                NewItem {
                    sku: sku.to_string(),
                    name: format!("Item {sku}"),
                    unit: None,
                    description: None,
                    min_stock_level: Some(min),
                },
            )
            .await
            .unwrap()
    }

    async fn warehouse(&self, name: &str, manager: Option<UserId>) -> Warehouse {
        self.warehouse_with(name, manager, None).await
    }

    async fn warehouse_with(
        &self,
        name: &str,
        manager: Option<UserId>,
        capacity: Option<i64>,
    ) -> Warehouse {
        self.services
            .create_warehouse(
                &self.admin,
                NewWarehouse {
                    name: name.to_string(),
                    location: None,
                    capacity,
                    manager_id: manager,
                },
            )
            .await
            .unwrap()
    }

    async fn transfer(
        &self,
        item: &Item,
        from: &Warehouse,
        to: &Warehouse,
        quantity: i64,
    ) -> warehub_transfers::Transfer {
        self.services
            .create_transfer(
                &self.admin,
                NewTransfer {
                    source_warehouse_id: from.id,
                    destination_warehouse_id: to.id,
                    lines: vec![NewTransferLine {
                        item_id: item.id,
                        quantity,
                    }],
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    async fn stock(&self, item: &Item, warehouse: &Warehouse, quantity: i64) {
        self.services
            .check_in(
                &self.admin,
                CheckIn {
                    item_id: item.id,
                    warehouse_id: warehouse.id,
                    quantity,
                    unit_cost: Some(dec!(10)),
                    reference: None,
                    note: None,
                    pending: false,
                },
            )
            .await
            .unwrap();
    }

    async fn on_hand(&self, item: &Item, warehouse: &Warehouse) -> i64 {
        self.services
            .list_balances(
                &self.admin,
                BalanceFilter {
                    item_id: Some(item.id),
                    warehouse_id: Some(warehouse.id),
                },
            )
            .await
            .unwrap()
            .first()
            .map(|b| b.quantity)
            .unwrap_or(0)
    }

    async fn move_transfer(&self, id: warehub_transfers::TransferId, to: TransferStatus) {
        self.services
            .transition_transfer(&self.admin, id, TransitionRequest::to(to))
            .await
            .unwrap();
    }

    /// Replays the completed ledger and compares it with stored balances.
    async fn assert_ledger_matches_balances(&self) {
        let ledger = self
            .services
            .list_transactions(
                &self.admin,
                MovementFilter {
                    status: Some(TransactionStatus::Completed),
                    ..MovementFilter::default()
                },
            )
            .await
            .unwrap();
        let mut replayed: HashMap<(warehub_inventory::ItemId, WarehouseId), i64> = HashMap::new();
        for tx in &ledger {
            for (warehouse_id, delta) in tx.movement().deltas() {
                *replayed.entry((tx.item_id, warehouse_id)).or_default() += delta;
            }
        }
        let balances: Vec<StockBalance> = self
            .services
            .list_balances(&self.admin, BalanceFilter::default())
            .await
            .unwrap();
        for balance in &balances {
            assert_eq!(
                replayed.get(&balance.key()).copied().unwrap_or(0),
                balance.quantity,
                "ledger and balance disagree"
            );
        }
        for (key, quantity) in replayed {
            if quantity != 0 {
                assert!(balances.iter().any(|b| b.key() == key));
            }
        }
    }
}

fn issue(item: &Item, warehouse: &Warehouse, quantity: i64) -> StockEntry {
    StockEntry {
        item_id: item.id,
        warehouse_id: warehouse.id,
        quantity,
        reference: None,
        note: None,
    }
}

#[tokio::test]
async fn check_in_then_issue_updates_balance_and_ledger() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;

    f.stock(&item, &main, 10).await;
    let tx = f.services.issue(&f.admin, issue(&item, &main, 4)).await.unwrap();

    assert_eq!(tx.kind, TransactionKind::Issue);
    assert_eq!(f.on_hand(&item, &main).await, 6);
    f.assert_ledger_matches_balances().await;
}

#[tokio::test]
async fn issuing_more_than_on_hand_writes_nothing() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;
    f.stock(&item, &main, 3).await;

    let err = f
        .services
        .issue(&f.admin, issue(&item, &main, 5))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");
    assert_eq!(f.on_hand(&item, &main).await, 3);
    let ledger = f
        .services
        .list_transactions(&f.admin, MovementFilter::default())
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn pending_check_in_applies_stock_only_when_confirmed() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;

    let tx = f
        .services
        .check_in(
            &f.admin,
            CheckIn {
                item_id: item.id,
                warehouse_id: main.id,
                quantity: 7,
                unit_cost: None,
                reference: Some("PO-1".to_string()),
                note: None,
                pending: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(f.on_hand(&item, &main).await, 0);

    let confirmed = f.services.confirm_transaction(&f.admin, tx.id).await.unwrap();
    assert!(confirmed.is_completed());
    assert_eq!(f.on_hand(&item, &main).await, 7);

    let again = f.services.confirm_transaction(&f.admin, tx.id).await;
    assert!(matches!(again, Err(ServiceError::Invariant(_))));
}

#[tokio::test]
async fn completed_transfer_moves_stock_between_warehouses() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 20).await;
    f.stock(&item, &south, 5).await;

    let transfer = f
        .services
        .create_transfer(
            &f.admin,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 8,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    f.move_transfer(transfer.id, TransferStatus::Approved).await;
    f.move_transfer(transfer.id, TransferStatus::InTransit).await;
    assert_eq!(f.on_hand(&item, &north).await, 20);
    f.move_transfer(transfer.id, TransferStatus::Completed).await;

    assert_eq!(f.on_hand(&item, &north).await, 12);
    assert_eq!(f.on_hand(&item, &south).await, 13);
    let stored = f.services.get_transfer(&f.admin, transfer.id).await.unwrap();
    assert_eq!(stored.status, TransferStatus::Completed);
    f.assert_ledger_matches_balances().await;
    assert!(f.sink.kinds().contains(&NotificationKind::TransferStatus));
}

#[tokio::test]
async fn rejecting_a_pending_transfer_leaves_inventory_alone() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 4).await;

    let transfer = f
        .services
        .create_transfer(
            &f.admin,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 4,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    let before = f
        .services
        .list_balances(&f.admin, BalanceFilter::default())
        .await
        .unwrap();
    f.move_transfer(transfer.id, TransferStatus::Rejected).await;
    let after = f
        .services
        .list_balances(&f.admin, BalanceFilter::default())
        .await
        .unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn pending_transfer_cannot_go_straight_to_in_transit() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 4).await;
    let transfer = f
        .services
        .create_transfer(
            &f.admin,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 2,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();

    let err = f
        .services
        .transition_transfer(&f.admin, transfer.id, TransitionRequest::to(TransferStatus::InTransit))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");
    let stored = f.services.get_transfer(&f.admin, transfer.id).await.unwrap();
    assert_eq!(stored.status, TransferStatus::Pending);
}

#[tokio::test]
async fn shipping_more_than_the_source_holds_is_refused() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 10).await;
    let transfer = f
        .services
        .create_transfer(
            &f.admin,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 8,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    f.move_transfer(transfer.id, TransferStatus::Approved).await;
    f.services.issue(&f.admin, issue(&item, &north, 5)).await.unwrap();

    let err = f
        .services
        .transition_transfer(&f.admin, transfer.id, TransitionRequest::to(TransferStatus::InTransit))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");

    let partial = TransitionRequest {
        quantities: vec![LineQuantity {
            item_id: item.id,
            quantity: 5,
        }],
        ..TransitionRequest::to(TransferStatus::InTransit)
    };
    let shipped = f
        .services
        .transition_transfer(&f.admin, transfer.id, partial)
        .await
        .unwrap();
    assert_eq!(shipped.lines[0].actual_quantity, Some(5));
}

#[tokio::test]
async fn refused_delivery_returns_to_source() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 10).await;
    let transfer = f
        .services
        .create_transfer(
            &f.admin,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 6,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    for status in [
        TransferStatus::Approved,
        TransferStatus::InTransit,
        TransferStatus::ReturnRequested,
    ] {
        f.move_transfer(transfer.id, status).await;
    }
    assert_eq!(f.on_hand(&item, &north).await, 4);
    let goods = f.services.list_rejected_goods(&f.admin, transfer.id).await.unwrap();
    assert_eq!(goods.len(), 1);
    assert_eq!(goods[0].status, RejectedGoodsStatus::PendingDisposition);

    for status in [
        TransferStatus::ReturnApproved,
        TransferStatus::ReturnShipped,
        TransferStatus::Returned,
    ] {
        f.move_transfer(transfer.id, status).await;
    }
    assert_eq!(f.on_hand(&item, &north).await, 10);
    assert_eq!(f.on_hand(&item, &south).await, 0);
    let goods = f.services.list_rejected_goods(&f.admin, transfer.id).await.unwrap();
    assert_eq!(goods[0].status, RejectedGoodsStatus::Returned);
    f.assert_ledger_matches_balances().await;
}

#[tokio::test]
async fn transfer_needs_a_manager_of_the_acting_side() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let source_manager = f.principal(Role::MANAGER);
    let other_manager = f.principal(Role::MANAGER);
    let north = f.warehouse("North", Some(source_manager.user_id)).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 10).await;
    let transfer = f
        .services
        .create_transfer(
            &source_manager,
            NewTransfer {
                source_warehouse_id: north.id,
                destination_warehouse_id: south.id,
                lines: vec![NewTransferLine {
                    item_id: item.id,
                    quantity: 1,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();

    let err = f
        .services
        .transition_transfer(&other_manager, transfer.id, TransitionRequest::to(TransferStatus::Approved))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "{err:?}");

    f.services
        .transition_transfer(&source_manager, transfer.id, TransitionRequest::to(TransferStatus::Approved))
        .await
        .unwrap();
}

#[tokio::test]
async fn plain_users_cannot_move_stock() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;
    let user = f.principal(Role::USER);

    let err = f
        .services
        .issue(&user, issue(&item, &main, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn managers_only_move_stock_in_their_warehouses() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let manager = f.principal(Role::MANAGER);
    let mine = f.warehouse("Mine", Some(manager.user_id)).await;
    let theirs = f.warehouse("Theirs", None).await;
    f.stock(&item, &mine, 5).await;
    f.stock(&item, &theirs, 5).await;

    f.services.issue(&manager, issue(&item, &mine, 1)).await.unwrap();
    let err = f
        .services
        .issue(&manager, issue(&item, &theirs, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(f.on_hand(&item, &theirs).await, 5);
}

#[tokio::test]
async fn archived_warehouses_refuse_stock() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;
    f.stock(&item, &main, 2).await;

    let err = f.services.archive_warehouse(&f.admin, main.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");

    f.services.issue(&f.admin, issue(&item, &main, 2)).await.unwrap();
    f.services.archive_warehouse(&f.admin, main.id).await.unwrap();
    let err = f
        .services
        .check_in(
            &f.admin,
            CheckIn {
                item_id: item.id,
                warehouse_id: main.id,
                quantity: 1,
                unit_cost: None,
                reference: None,
                note: None,
                pending: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");

    f.services.restore_warehouse(&f.admin, main.id).await.unwrap();
    f.stock(&item, &main, 1).await;
}

#[tokio::test]
async fn request_falls_back_to_a_donor_warehouse() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let manager = f.principal(Role::MANAGER);
    let requester = f.principal(Role::USER);
    let site = f.warehouse("Site", Some(manager.user_id)).await;
    let depot = f.warehouse("Depot", None).await;
    f.stock(&item, &site, 2).await;
    f.stock(&item, &depot, 10).await;

    let request = f
        .services
        .create_request(
            &requester,
            NewRequest {
                warehouse_id: site.id,
                items: vec![NewRequestItem {
                    item_id: item.id,
                    quantity: 5,
                }],
                purpose: None,
            },
        )
        .await
        .unwrap();

    let first = f
        .services
        .approve_request(&manager, request.id, None)
        .await
        .unwrap();
    assert_eq!(first.status, RequestStatus::ManagerApproved);
    assert_eq!(f.on_hand(&item, &depot).await, 10);

    let approved = f
        .services
        .approve_request(&f.admin, request.id, Some("ok".to_string()))
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.fulfillment.len(), 1);
    assert_eq!(approved.fulfillment[0].warehouse_id, depot.id);
    assert_eq!(f.on_hand(&item, &site).await, 2);
    assert_eq!(f.on_hand(&item, &depot).await, 5);
    f.assert_ledger_matches_balances().await;

    let seen = f.services.get_request(&requester, request.id).await.unwrap();
    assert_eq!(seen.status, RequestStatus::Approved);
}

#[tokio::test]
async fn unfulfillable_request_stays_open() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let site = f.warehouse("Site", None).await;
    f.stock(&item, &site, 1).await;
    let request = f
        .services
        .create_request(
            &f.admin,
            NewRequest {
                warehouse_id: site.id,
                items: vec![NewRequestItem {
                    item_id: item.id,
                    quantity: 3,
                }],
                purpose: None,
            },
        )
        .await
        .unwrap();

    let err = f
        .services
        .approve_request(&f.admin, request.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");
    let stored = f.services.get_request(&f.admin, request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(f.on_hand(&item, &site).await, 1);
}

#[tokio::test]
async fn users_only_see_their_own_requests() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let site = f.warehouse("Site", None).await;
    let alice = f.principal(Role::USER);
    let bob = f.principal(Role::USER);
    let request = f
        .services
        .create_request(
            &alice,
            NewRequest {
                warehouse_id: site.id,
                items: vec![NewRequestItem {
                    item_id: item.id,
                    quantity: 1,
                }],
                purpose: Some("repairs".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(f.services.list_requests(&bob).await.unwrap().is_empty());
    assert_eq!(
        f.services.get_request(&bob, request.id).await,
        Err(ServiceError::NotFound("request"))
    );
    assert_eq!(f.services.list_requests(&f.admin).await.unwrap().len(), 1);

    let cancelled = f.services.cancel_request(&alice, request.id).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn fulfilling_a_sales_order_issues_every_line() {
    let f = Fixture::new();
    let bolt = f.item("BOLT", 0).await;
    let nut = f.item("NUT", 0).await;
    let main = f.warehouse("Main", None).await;
    f.stock(&bolt, &main, 10).await;
    f.stock(&nut, &main, 10).await;

    let order = f
        .services
        .create_sales_order(
            &f.admin,
            NewSalesOrder {
                customer_name: "Acme".to_string(),
                warehouse_id: main.id,
                lines: vec![NewOrderLine {
                    item_id: bolt.id,
                    quantity: 3,
                    unit_price: dec!(2.50),
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    let order = f
        .services
        .add_order_line(
            &f.admin,
            order.id,
            NewOrderLine {
                item_id: nut.id,
                quantity: 4,
                unit_price: dec!(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(order.total(), dec!(11.50));

    f.services.confirm_sales_order(&f.admin, order.id).await.unwrap();
    let fulfilled = f.services.fulfil_sales_order(&f.admin, order.id).await.unwrap();

    assert_eq!(fulfilled.status, SalesOrderStatus::Fulfilled);
    assert_eq!(f.on_hand(&bolt, &main).await, 7);
    assert_eq!(f.on_hand(&nut, &main).await, 6);
    let issued = f
        .services
        .list_transactions(
            &f.admin,
            MovementFilter {
                reference: Some(order.code.to_string()),
                ..MovementFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(issued.len(), 2);
    assert!(f.sink.kinds().contains(&NotificationKind::SalesOrder));
}

#[tokio::test]
async fn dropping_below_minimum_notifies_the_manager() {
    let f = Fixture::new();
    let item = f.item("BOLT", 5).await;
    let manager = f.principal(Role::MANAGER);
    let main = f.warehouse("Main", Some(manager.user_id)).await;
    f.stock(&item, &main, 8).await;

    f.services.issue(&manager, issue(&item, &main, 2)).await.unwrap();
    assert!(!f.sink.kinds().contains(&NotificationKind::LowStock));

    f.services.issue(&manager, issue(&item, &main, 2)).await.unwrap();
    let inbox = f.services.list_notifications(&manager).await.unwrap();
    let low = inbox
        .iter()
        .find(|n| n.kind == NotificationKind::LowStock)
        .unwrap();
    assert_eq!(low.reference.as_deref(), Some("BOLT"));
    assert!(f.sink.kinds().contains(&NotificationKind::LowStock));

    let read = f.services.mark_notification_read(&manager, low.id).await.unwrap();
    assert!(read.read);
    let stranger = f.principal(Role::MANAGER);
    assert_eq!(
        f.services.mark_notification_read(&stranger, low.id).await,
        Err(ServiceError::NotFound("notification"))
    );

    let low_stock = f.services.low_stock(&f.admin).await.unwrap();
    assert_eq!(low_stock.len(), 1);
    assert_eq!(low_stock[0].quantity, 4);
}

#[tokio::test]
async fn disabled_low_stock_notifications_stay_quiet() {
    let f = Fixture::new();
    f.services
        .update_settings(
            &f.admin,
            SettingsPatch {
                low_stock_notifications: Some(false),
                ..SettingsPatch::default()
            },
        )
        .await
        .unwrap();
    let item = f.item("BOLT", 5).await;
    let main = f.warehouse("Main", None).await;
    f.stock(&item, &main, 6).await;
    f.services.issue(&f.admin, issue(&item, &main, 3)).await.unwrap();

    assert!(f.sink.kinds().is_empty());
}

#[tokio::test]
async fn valuation_uses_the_configured_method() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;
    for (quantity, cost) in [(10, dec!(2)), (30, dec!(4))] {
        f.services
            .check_in(
                &f.admin,
                CheckIn {
                    item_id: item.id,
                    warehouse_id: main.id,
                    quantity,
                    unit_cost: Some(cost),
                    reference: None,
                    note: None,
                    pending: false,
                },
            )
            .await
            .unwrap();
    }
    f.services.issue(&f.admin, issue(&item, &main, 20)).await.unwrap();

    let report = f
        .services
        .valuation(&f.admin, ValuationQuery::default())
        .await
        .unwrap();
    assert_eq!(report.method, ValuationMethod::AverageValue);
    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].quantity, 20);
    assert_eq!(report.lines[0].unit_value, Some(dec!(3.5)));
    assert_eq!(report.total_value, dec!(70));

    let last = f
        .services
        .valuation(
            &f.admin,
            ValuationQuery {
                method: Some("last".to_string()),
                ..ValuationQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(last.total_value, dec!(80));

    let bad = f
        .services
        .valuation(
            &f.admin,
            ValuationQuery {
                method: Some("fifo".to_string()),
                ..ValuationQuery::default()
            },
        )
        .await;
    assert!(matches!(bad, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn stock_summary_breaks_totals_down_by_warehouse() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 3).await;
    f.stock(&item, &south, 4).await;

    let summary = f.services.stock_summary(&f.admin).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].total_quantity, 7);
    assert_eq!(summary[0].warehouses.len(), 2);
}

#[tokio::test]
async fn duplicate_skus_surface_as_duplicates() {
    let f = Fixture::new();
    f.item("BOLT", 0).await;
    let err = f
        .services
        .create_item(
            &f.admin,
            NewItem {
                sku: "bolt".to_string(),
                name: "Another bolt".to_string(),
                unit: None,
                description: None,
                min_stock_level: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Duplicate(_)), "{err:?}");
}

#[tokio::test]
async fn conflicts_are_retried_then_surfaced() {
    let f = Fixture::new();
    let services = f.services.clone().with_conflict_retries(2);
    let attempts = AtomicU32::new(0);

    let result: ServiceResult<()> = services
        .with_retry("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            ready(Err(ServiceError::Conflict("stale".to_string())))
        })
        .await;
    assert_eq!(result, Err(ServiceError::Conflict("stale".to_string())));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let attempts = AtomicU32::new(0);
    let result = services
        .with_retry("test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            ready(if n == 0 {
                Err(ServiceError::Conflict("stale".to_string()))
            } else {
                Ok(n)
            })
        })
        .await;
    assert_eq!(result, Ok(1));
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

    #[test]
    fn random_check_ins_and_issues_never_go_negative(
        ops in proptest::collection::vec((proptest::bool::ANY, 1i64..20), 1..25)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let f = Fixture::new();
            let item = f.item("BOLT", 0).await;
            let main = f.warehouse("Main", None).await;
            let mut expected = 0i64;
            for (receive, quantity) in ops {
                if receive {
                    f.stock(&item, &main, quantity).await;
                    expected += quantity;
                    continue;
                }
                let result = f.services.issue(&f.admin, issue(&item, &main, quantity)).await;
                if quantity <= expected {
                    assert!(result.is_ok(), "{result:?}");
                    expected -= quantity;
                } else {
                    assert!(matches!(result, Err(ServiceError::Invariant(_))), "{result:?}");
                }
            }
            assert_eq!(f.on_hand(&item, &main).await, expected);
            f.assert_ledger_matches_balances().await;
        });
    }
}

fn receipt(item: &Item, warehouse: &Warehouse, quantity: i64) -> CheckIn {
    CheckIn {
        item_id: item.id,
        warehouse_id: warehouse.id,
        quantity,
        unit_cost: None,
        reference: None,
        note: None,
        pending: false,
    }
}

#[tokio::test]
async fn check_in_beyond_capacity_is_refused() {
    let f = Fixture::new();
    let bolt = f.item("BOLT", 0).await;
    let nut = f.item("NUT", 0).await;
    let small = f.warehouse_with("Small", None, Some(10)).await;
    f.stock(&bolt, &small, 8).await;

    let err = f
        .services
        .check_in(&f.admin, receipt(&nut, &small, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");
    assert_eq!(f.on_hand(&nut, &small).await, 0);

    f.services
        .check_in(&f.admin, receipt(&nut, &small, 2))
        .await
        .unwrap();
    assert_eq!(f.on_hand(&nut, &small).await, 2);
}

#[tokio::test]
async fn completing_a_transfer_respects_destination_capacity() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse_with("South", None, Some(5)).await;
    f.stock(&item, &north, 10).await;
    f.stock(&item, &south, 3).await;

    let transfer = f.transfer(&item, &north, &south, 4).await;
    f.move_transfer(transfer.id, TransferStatus::Approved).await;
    f.move_transfer(transfer.id, TransferStatus::InTransit).await;
    let err = f
        .services
        .transition_transfer(&f.admin, transfer.id, TransitionRequest::to(TransferStatus::Completed))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Invariant(_)), "{err:?}");
    assert_eq!(f.on_hand(&item, &north).await, 10);
    assert_eq!(f.on_hand(&item, &south).await, 3);
    let transfer = f.services.get_transfer(&f.admin, transfer.id).await.unwrap();
    assert_eq!(transfer.status, TransferStatus::InTransit);
}

#[tokio::test]
async fn disposing_refused_goods_settles_them_without_moving_stock() {
    let f = Fixture::new();
    let item = f.item("BOLT", 0).await;
    let north = f.warehouse("North", None).await;
    let south = f.warehouse("South", None).await;
    f.stock(&item, &north, 10).await;

    let transfer = f.transfer(&item, &north, &south, 6).await;
    for status in [
        TransferStatus::Approved,
        TransferStatus::InTransit,
        TransferStatus::ReturnRequested,
    ] {
        f.move_transfer(transfer.id, status).await;
    }
    let before = f.on_hand(&item, &north).await;
    assert_eq!(before, 4);

    f.move_transfer(transfer.id, TransferStatus::Disposed).await;

    let goods = f.services.list_rejected_goods(&f.admin, transfer.id).await.unwrap();
    assert!(!goods.is_empty());
    assert!(goods.iter().all(|g| g.status == RejectedGoodsStatus::Disposed));
    assert_eq!(f.on_hand(&item, &north).await, before);
    assert_eq!(f.on_hand(&item, &south).await, 0);
    f.assert_ledger_matches_balances().await;
}

/// In-memory store that yields to the scheduler before every call, so two
/// joined operations interleave their reads and writes.
struct YieldingStore(InMemoryStore);

#[async_trait::async_trait]
impl Store for YieldingStore {
    async fn commit(&self, tenant_id: TenantId, changes: ChangeSet) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.commit(tenant_id, changes).await
    }

    async fn get_item(&self, tenant_id: TenantId, id: ItemId) -> Result<Option<Item>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_item(tenant_id, id).await
    }

    async fn list_items(&self, tenant_id: TenantId) -> Result<Vec<Item>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_items(tenant_id).await
    }

    async fn get_warehouse(
        &self,
        tenant_id: TenantId,
        id: WarehouseId,
    ) -> Result<Option<Warehouse>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_warehouse(tenant_id, id).await
    }

    async fn list_warehouses(&self, tenant_id: TenantId) -> Result<Vec<Warehouse>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_warehouses(tenant_id).await
    }

    async fn list_balances(
        &self,
        tenant_id: TenantId,
        filter: BalanceFilter,
    ) -> Result<Vec<StockBalance>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_balances(tenant_id, filter).await
    }

    async fn get_transaction(
        &self,
        tenant_id: TenantId,
        id: warehub_inventory::TransactionId,
    ) -> Result<Option<warehub_inventory::Transaction>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_transaction(tenant_id, id).await
    }

    async fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> Result<Vec<warehub_inventory::Transaction>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_transactions(tenant_id, filter).await
    }

    async fn get_transfer(
        &self,
        tenant_id: TenantId,
        id: warehub_transfers::TransferId,
    ) -> Result<Option<warehub_transfers::Transfer>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_transfer(tenant_id, id).await
    }

    async fn list_transfers(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<warehub_transfers::Transfer>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_transfers(tenant_id).await
    }

    async fn list_rejected_goods(
        &self,
        tenant_id: TenantId,
        transfer_id: warehub_transfers::TransferId,
    ) -> Result<Vec<warehub_transfers::RejectedGoods>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_rejected_goods(tenant_id, transfer_id).await
    }

    async fn get_request(
        &self,
        tenant_id: TenantId,
        id: warehub_requests::RequestId,
    ) -> Result<Option<warehub_requests::Request>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_request(tenant_id, id).await
    }

    async fn list_requests(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<warehub_requests::Request>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_requests(tenant_id).await
    }

    async fn get_sales_order(
        &self,
        tenant_id: TenantId,
        id: warehub_sales::SalesOrderId,
    ) -> Result<Option<warehub_sales::SalesOrder>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_sales_order(tenant_id, id).await
    }

    async fn list_sales_orders(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<warehub_sales::SalesOrder>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_sales_orders(tenant_id).await
    }

    async fn get_notification(
        &self,
        tenant_id: TenantId,
        id: crate::notifications::NotificationId,
    ) -> Result<Option<Notification>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_notification(tenant_id, id).await
    }

    async fn list_notifications(
        &self,
        tenant_id: TenantId,
        user: UserId,
    ) -> Result<Vec<Notification>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_notifications(tenant_id, user).await
    }

    async fn get_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<crate::settings::OrganizationSettings>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get_settings(tenant_id).await
    }
}

#[tokio::test]
async fn concurrent_check_ins_cannot_overfill_a_warehouse() {
    let f = Fixture::with_store(Arc::new(YieldingStore(InMemoryStore::new())));
    let bolt = f.item("BOLT", 0).await;
    let nut = f.item("NUT", 0).await;
    let small = f.warehouse_with("Small", None, Some(10)).await;

    let (a, b) = tokio::join!(
        f.services.check_in(&f.admin, receipt(&bolt, &small, 8)),
        f.services.check_in(&f.admin, receipt(&nut, &small, 8)),
    );

    assert!(a.is_ok() != b.is_ok(), "{a:?} / {b:?}");
    let refused = if a.is_err() { a } else { b };
    assert!(matches!(refused, Err(ServiceError::Invariant(_))), "{refused:?}");
    let total = f.on_hand(&bolt, &small).await + f.on_hand(&nut, &small).await;
    assert_eq!(total, 8);
    f.assert_ledger_matches_balances().await;
}

#[tokio::test]
async fn archiving_races_with_check_in_consistently() {
    let f = Fixture::with_store(Arc::new(YieldingStore(InMemoryStore::new())));
    let item = f.item("BOLT", 0).await;
    let main = f.warehouse("Main", None).await;

    let (received, archived) = tokio::join!(
        f.services.check_in(&f.admin, receipt(&item, &main, 5)),
        f.services.archive_warehouse(&f.admin, main.id),
    );

    assert!(received.is_ok() != archived.is_ok(), "{received:?} / {archived:?}");
    let warehouse = f.services.get_warehouse(&f.admin, main.id).await.unwrap();
    let on_hand = f.on_hand(&item, &main).await;
    if warehouse.is_active() {
        assert_eq!(on_hand, 5);
    } else {
        assert_eq!(on_hand, 0);
    }
}
