use crate::inventory::ServerInventory;
use bmc_proto::TokenService;
use std::sync::Arc;

#[derive(Clone)]
pub struct ManagerState {
    pub inventory: ServerInventory,
    pub tokens: Arc<TokenService>,
}
