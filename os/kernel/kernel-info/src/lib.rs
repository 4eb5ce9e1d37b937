//! # Kernel Resource Configuration
//!
//! The authoritative source for the build-time constants that size the
//! kernel's resource-management layer: the disk block cache and the physical
//! page allocator. Centralizing them here keeps every subsystem (and every
//! test that instantiates scaled-down replicas) in agreement and prevents
//! configuration drift.
//!
//! ## Overview
//!
//! Both managed pools are fixed at build time; nothing here is a runtime
//! tunable. The components take their geometry as const generics, and this
//! crate supplies the canonical values at the kernel facade:
//!
//! ```text
//! Managed physical memory (MANAGED_FRAMES * PAGE_SIZE bytes):
//!
//! arena base ┌────────────┬────────────┬─────┬──────────────┐
//!            │ cpu 0 seed │ cpu 1 seed │ ... │ cpu N-1 seed │
//!            └────────────┴────────────┴─────┴──────────────┘
//!            disjoint contiguous slices, one free list per core
//!
//! Block cache (BLOCK_POOL_SIZE buffers, BLOCK_SIZE bytes each):
//!
//!            bucket 0 ──► [buf] ─ [buf]
//!            bucket 1 ──► [buf]
//!              ...        BLOCK_BUCKETS spin-locked hash buckets
//! ```
//!
//! ## Validation
//!
//! Constraints between constants are enforced with compile-time assertions
//! next to their definitions; an invalid configuration fails the build, not
//! the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod block;
pub mod memory;
