//! Type-safe tokens identifying providers in the container.
//!
//! A token combines a logical type, a name, and an optional qualifier into
//! an immutable identity. Equality and the hash consider only those identity
//! fields; the declared [`Scope`] rides along as lifecycle metadata. The hash
//! is computed once at construction so registry and layer lookups never
//! re-hash the name or qualifier.

use std::any::TypeId;
use std::borrow::Cow;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use rustc_hash::FxHasher;

use crate::scope::Scope;

/// Erased token identity used as the map key throughout the container.
///
/// Two keys are equal iff type, name, and qualifier all match. The declared
/// scope is deliberately excluded from equality and hashing: it is checked
/// separately at registration, where an equal key arriving with a different
/// scope is a configuration error.
#[derive(Debug, Clone)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    name: Cow<'static, str>,
    qualifier: Option<Cow<'static, str>>,
    scope: Scope,
    hash: u64,
}

impl Key {
    fn new(
        type_id: TypeId,
        type_name: &'static str,
        name: Cow<'static, str>,
        qualifier: Option<Cow<'static, str>>,
        scope: Scope,
    ) -> Self {
        let mut hasher = FxHasher::default();
        type_id.hash(&mut hasher);
        name.hash(&mut hasher);
        qualifier.hash(&mut hasher);
        let hash = hasher.finish();
        Self {
            type_id,
            type_name,
            name,
            qualifier,
            scope,
            hash,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// The lifecycle scope declared for this token.
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.type_id == other.type_id
            && self.name == other.name
            && self.qualifier == other.qualifier
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}@{} ({})", self.name, q, self.type_name),
            None => write!(f, "{} ({})", self.name, self.type_name),
        }
    }
}

/// A typed token identifying one provider registration.
///
/// Tokens are immutable and cheap to clone; define them once and share them
/// between registration and resolution sites.
///
/// # Examples
///
/// ```
/// use ampule::{Scope, Token};
///
/// struct Database;
///
/// let db: Token<Database> = Token::new("database").with_scope(Scope::Singleton);
/// let replica = db.clone().with_qualifier("replica");
/// assert_ne!(db.key(), replica.key());
/// ```
pub struct Token<T> {
    key: Key,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Token<T> {
    /// Creates a token with the given name and the default (transient) scope.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key: Key::new(
                TypeId::of::<T>(),
                std::any::type_name::<T>(),
                name.into(),
                None,
                Scope::default(),
            ),
            _marker: PhantomData,
        }
    }

    /// Creates a token whose name is derived from the type's name.
    ///
    /// The short type name (without the module path) is lowercased, so
    /// `Token::<Database>::of()` is named `"database"`.
    pub fn of() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short.to_lowercase())
    }

    /// Returns a derived token with the given qualifier.
    ///
    /// The qualifier participates in identity: `db` and `db@replica` are
    /// distinct registrations.
    pub fn with_qualifier(self, qualifier: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key: Key::new(
                self.key.type_id,
                self.key.type_name,
                self.key.name,
                Some(qualifier.into()),
                self.key.scope,
            ),
            _marker: PhantomData,
        }
    }

    /// Returns a derived token with the given declared scope.
    ///
    /// Scope is metadata, not identity: the derived token still compares
    /// equal to the original.
    pub fn with_scope(self, scope: Scope) -> Self {
        Self {
            key: Key {
                scope,
                ..self.key
            },
            _marker: PhantomData,
        }
    }

    /// The erased identity key of this token.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The token's name.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// The token's declared scope.
    pub fn scope(&self) -> Scope {
        self.key.scope()
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("name", &self.key.name)
            .field("qualifier", &self.key.qualifier)
            .field("scope", &self.key.scope)
            .field("type", &self.key.type_name)
            .finish()
    }
}

impl<T> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Token<T> {}

impl<T> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;
    struct Cache;

    #[test]
    fn test_token_creation() {
        let token: Token<Database> = Token::new("database");
        assert_eq!(token.name(), "database");
        assert_eq!(token.scope(), Scope::Transient);
        assert_eq!(token.key().qualifier(), None);
    }

    #[test]
    fn test_token_hashing() {
        let token1: Token<Database> = Token::new("database");
        let token2: Token<Database> = Token::new("database");
        let token3: Token<Cache> = Token::new("cache");

        assert_eq!(token1, token2);
        let mut map = rustc_hash::FxHashMap::default();
        map.insert(token1.key().clone(), "value1");
        assert_eq!(map.get(token2.key()), Some(&"value1"));
        assert_eq!(map.get(token3.key()), None);
    }

    #[test]
    fn test_scope_is_not_identity() {
        let token1: Token<Database> = Token::new("database").with_scope(Scope::Singleton);
        let token2: Token<Database> = Token::new("database").with_scope(Scope::Request);
        assert_eq!(token1, token2);
        assert_ne!(token1.scope(), token2.scope());
    }

    #[test]
    fn test_type_is_identity() {
        let token1: Token<Database> = Token::new("store");
        let token2: Token<Cache> = Token::new("store");
        assert_ne!(token1.key(), token2.key());
    }

    #[test]
    fn test_token_with_qualifier() {
        let primary: Token<Database> = Token::new("database").with_qualifier("primary");
        let secondary: Token<Database> = Token::new("database").with_qualifier("secondary");
        let primary2: Token<Database> = Token::new("database").with_qualifier("primary");

        assert_ne!(primary.key(), secondary.key());
        assert_eq!(primary.key(), primary2.key());
        assert_eq!(primary.key().qualifier(), Some("primary"));
    }

    #[test]
    fn test_token_of_derives_name() {
        let token: Token<Database> = Token::of();
        assert_eq!(token.name(), "database");
    }

    #[test]
    fn test_display_names_type() {
        let token: Token<Database> = Token::new("db").with_qualifier("replica");
        let rendered = token.key().to_string();
        assert!(rendered.contains("db@replica"));
        assert!(rendered.contains("Database"));
    }
}
