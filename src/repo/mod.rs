pub mod firebase;

pub use firebase::FirebaseStore;
