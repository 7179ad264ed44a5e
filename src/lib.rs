//! 거래소 원장 수집 및 잔고 대사 시스템
//!
//! 외부 거래소 API에서 거래/입출금 내역을 증분 수집하여 로컬 원장에 저장하고,
//! 거래소가 보고한 잔고 스냅샷과 대사합니다.

pub mod balance;
pub mod client;
pub mod config;
pub mod db;
pub mod ingest;
pub mod reconcile;
