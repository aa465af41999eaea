//! Batch resolution over a fixed set of tokens.
//!
//! A [`Dependencies`] value declares its member tokens up front and resolves
//! them lazily: sequentially on the sync path, concurrently on the async
//! path. Results are cached in the set after the first successful
//! resolution; a failed resolution caches nothing.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use futures_util::future::join_all;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, ResolutionError, ResolutionKind};
use crate::provider::{Injectable, Instance};
use crate::token::{Key, Token};

/// The tuple of token references a [`Dependencies`] set is built over.
///
/// Implemented for tuples of `&Token<T>` up to arity eight.
pub trait TokenSet {
    fn keys(&self) -> Vec<Key>;
}

macro_rules! token_set_tuple {
    ($($member:ident),+) => {
        impl<$($member: 'static),+> TokenSet for ($(&Token<$member>,)+) {
            fn keys(&self) -> Vec<Key> {
                #[allow(non_snake_case)]
                let ($($member,)+) = self;
                vec![$($member.key().clone(),)+]
            }
        }
    };
}

token_set_tuple!(A);
token_set_tuple!(A, B);
token_set_tuple!(A, B, C);
token_set_tuple!(A, B, C, D);
token_set_tuple!(A, B, C, D, E);
token_set_tuple!(A, B, C, D, E, F);
token_set_tuple!(A, B, C, D, E, F, G);
token_set_tuple!(A, B, C, D, E, F, G, H);

/// Lazily resolved, type-indexed batch of dependencies.
///
/// Built from [`Context::dependencies`]. Membership and size are known
/// before anything resolves; access by type resolves the whole set on first
/// use and answers from the cache afterwards.
pub struct Dependencies {
    ctx: Context,
    keys: Vec<Key>,
    resolved: OnceLock<FxHashMap<TypeId, Instance>>,
}

impl Dependencies {
    pub(crate) fn new(ctx: Context, keys: Vec<Key>) -> Self {
        Self {
            ctx,
            keys,
            resolved: OnceLock::new(),
        }
    }

    /// Number of declared member tokens. Available before resolution.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True if a token for `T` is part of the declared set. Never resolves.
    pub fn contains<T: 'static>(&self) -> bool {
        let ty = TypeId::of::<T>();
        self.keys.iter().any(|k| k.type_id() == ty)
    }

    /// Resolves every member sequentially, in declaration order.
    ///
    /// The first failure propagates and nothing is cached; a later call
    /// starts over. A second call after success is a no-op.
    pub fn resolve(&self) -> Result<(), Error> {
        self.ensure_resolved().map(|_| ())
    }

    /// Resolves every member concurrently.
    ///
    /// Each member resolves on its own flow (a clone of the set's context),
    /// so one slow provider does not serialize the others. On failure the
    /// first error in declaration order propagates and nothing is cached.
    pub async fn resolve_async(&self) -> Result<(), Error> {
        if self.resolved.get().is_some() {
            return Ok(());
        }
        debug!(members = self.keys.len(), "resolving dependency set");

        let member_futures: Vec<_> = self
            .keys
            .iter()
            .map(|key| {
                let ctx = self.ctx.clone();
                let key = key.clone();
                async move {
                    let instance = ctx.aget_erased(&key).await?;
                    Ok::<_, Error>((key.type_id(), instance))
                }
            })
            .collect();

        let mut map = FxHashMap::default();
        for outcome in join_all(member_futures).await {
            let (ty, instance) = outcome?;
            map.insert(ty, instance);
        }
        let _ = self.resolved.set(map);
        Ok(())
    }

    /// Typed access to one resolved member.
    ///
    /// Resolves the whole set on first access (sequentially; call
    /// [`resolve_async`](Self::resolve_async) first from async code).
    /// Requesting a type outside the declared set is its own error,
    /// detectable without any resolution having happened.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>, Error> {
        let ty = TypeId::of::<T>();
        let key = self
            .keys
            .iter()
            .find(|k| k.type_id() == ty)
            .ok_or_else(|| self.not_in_set::<T>())?;

        let map = self.ensure_resolved()?;
        let instance = map.get(&ty).cloned().ok_or_else(|| self.not_in_set::<T>())?;
        instance
            .downcast::<T>()
            .map_err(|_| ResolutionError::new(key, ResolutionKind::TypeMismatch).into())
    }

    fn ensure_resolved(&self) -> Result<&FxHashMap<TypeId, Instance>, Error> {
        if let Some(map) = self.resolved.get() {
            return Ok(map);
        }
        debug!(members = self.keys.len(), "resolving dependency set");

        let mut map = FxHashMap::default();
        for key in &self.keys {
            let instance = self.ctx.get_erased(key)?;
            map.insert(key.type_id(), instance);
        }
        Ok(self.resolved.get_or_init(|| map))
    }

    fn not_in_set<T>(&self) -> Error {
        Error::NotInSet {
            requested: std::any::type_name::<T>(),
            members: self
                .keys
                .iter()
                .map(|k| k.name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("members", &self.keys.len())
            .field("resolved", &self.resolved.get().is_some())
            .finish()
    }
}
