pub(crate) mod helpers;
mod meal;
mod pantry;
mod product;
mod receipt;
mod sync;

pub(crate) use meal::{
    LogMealArgs, cmd_meal_delete, cmd_meal_list, cmd_meal_log, cmd_meal_stats, cmd_meal_totals,
};
pub(crate) use pantry::{
    AddItemArgs, UpdateItemArgs, cmd_add, cmd_delete, cmd_expired, cmd_expiring, cmd_list,
    cmd_show, cmd_update,
};
pub(crate) use product::{
    NewProductArgs, cmd_product_add, cmd_product_delete, cmd_product_list, cmd_product_show,
};
pub(crate) use receipt::{
    cmd_receipt_add, cmd_receipt_delete, cmd_receipt_list, cmd_receipt_process, cmd_receipt_show,
};
pub(crate) use sync::{cmd_sync_catalog, cmd_sync_retry, cmd_sync_run, cmd_sync_status};
