//! Inter-warehouse transfers.
//!
//! A [`Transfer`] moves through an explicit status table. Each transition is
//! authorized against a [`TransferActor`] and returns a [`TransferPlan`]
//! describing the stock movements and rejected-goods updates the caller must
//! commit together with the new transfer state.

pub mod rejected;
pub mod status;
pub mod transfer;

pub use rejected::{RejectedGoods, RejectedGoodsId, RejectedGoodsStatus};
pub use status::{Authority, TransferActor, TransferStatus};
pub use transfer::{
    GoodsAction, LineQuantity, NewTransfer, NewTransferLine, StatusChange, StockCheck, Transfer,
    TransferId, TransferLine, TransferPlan, TransitionRequest,
};
