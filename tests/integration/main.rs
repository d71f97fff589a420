//! End-to-end tests over the in-memory store, the local backend and the
//! in-process task runner.

mod helpers;
mod maintenance_test;
mod permission_test;
mod transfer_test;
