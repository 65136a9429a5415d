pub mod best_deal;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod store;
pub mod sync;
