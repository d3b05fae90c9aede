// Resource addressing - parsing, ancestry, and the routing table that maps
// addresses onto the collection/item kinds.

use crate::error::{InventoryError, Result};
use crate::schema::{self, PATH_PRODUCTS};
use regex::Regex;
use std::fmt;

const SCHEME: &str = "content://";

/// A parsed resource address: `<authority>/<segment>/<segment>...`.
///
/// Parsing only checks the general shape. Whether an address names something
/// the store understands is decided by [`AddressMatcher::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    authority: String,
    segments: Vec<String>,
}

impl Address {
    /// Parse an address string. A leading `content://` is accepted and dropped,
    /// as is a trailing slash.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(SCHEME).unwrap_or(trimmed);
        let body = body.strip_suffix('/').unwrap_or(body);

        let mut parts = body.split('/');
        let authority = match parts.next() {
            Some(a) if !a.is_empty() => a.to_string(),
            _ => return Err(InventoryError::UnrecognizedAddress(raw.to_string())),
        };

        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(InventoryError::UnrecognizedAddress(raw.to_string()));
        }

        Ok(Address {
            authority,
            segments,
        })
    }

    /// The collection address for all products under `authority`.
    pub fn products(authority: &str) -> Self {
        Address {
            authority: authority.trim().to_string(),
            segments: vec![PATH_PRODUCTS.to_string()],
        }
    }

    /// The item address for a single product under `authority`.
    pub fn product(authority: &str, id: i64) -> Self {
        Address::products(authority).with_appended_id(id)
    }

    /// Append a numeric id as a new trailing segment.
    pub fn with_appended_id(&self, id: i64) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Address {
            authority: self.authority.clone(),
            segments,
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The path below the authority, without a leading slash.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// The address one level up, or `None` for a bare authority.
    pub fn parent(&self) -> Option<Address> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Address {
            authority: self.authority.clone(),
            segments,
        })
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn covers(&self, other: &Address) -> bool {
        self.authority == other.authority
            && self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

/// The two shapes of address the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Collection,
    Item,
}

/// An address after routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Collection,
    Item(i64),
}

impl Target {
    pub fn kind(&self) -> AddressKind {
        match self {
            Target::Collection => AddressKind::Collection,
            Target::Item(_) => AddressKind::Item,
        }
    }
}

struct Route {
    pattern: Regex,
    kind: AddressKind,
}

/// Routing table from path patterns to address kinds.
///
/// Patterns use `#` for a numeric segment and `*` for any single segment,
/// everything else matches literally. The table is built once and read-only
/// afterwards.
pub struct AddressMatcher {
    authority: String,
    routes: Vec<Route>,
}

impl AddressMatcher {
    /// The standard table: `products` is the collection, `products/#` an item.
    pub fn new(authority: &str) -> Result<Self> {
        let mut matcher = AddressMatcher {
            authority: authority.trim().to_string(),
            routes: Vec::new(),
        };
        matcher.add_route(PATH_PRODUCTS, AddressKind::Collection)?;
        matcher.add_route(&format!("{PATH_PRODUCTS}/#"), AddressKind::Item)?;
        Ok(matcher)
    }

    fn add_route(&mut self, pattern: &str, kind: AddressKind) -> Result<()> {
        let body: Vec<String> = pattern
            .split('/')
            .map(|segment| match segment {
                "#" => r"(\d+)".to_string(),
                "*" => r"([^/]+)".to_string(),
                literal => regex::escape(literal),
            })
            .collect();
        let regex = Regex::new(&format!("^{}$", body.join("/")))
            .map_err(|e| InventoryError::Config(format!("Bad route pattern '{pattern}': {e}")))?;
        self.routes.push(Route {
            pattern: regex,
            kind,
        });
        Ok(())
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The collection address served by this matcher.
    pub fn collection(&self) -> Address {
        Address::products(&self.authority)
    }

    /// The one spelling of a routed address. Ids are rendered without
    /// leading zeros, so `products/007` and `products/7` share observers.
    pub fn canonical(&self, target: Target) -> Address {
        match target {
            Target::Collection => self.collection(),
            Target::Item(id) => self.collection().with_appended_id(id),
        }
    }

    /// Route an address. Anything outside the table, under another authority,
    /// or carrying a non-positive id is `UnrecognizedAddress`.
    pub fn resolve(&self, address: &Address) -> Result<Target> {
        let unrecognized = || InventoryError::UnrecognizedAddress(address.to_string());

        if address.authority() != self.authority {
            return Err(unrecognized());
        }

        let path = address.path();
        for route in &self.routes {
            let Some(captures) = route.pattern.captures(&path) else {
                continue;
            };
            return match route.kind {
                AddressKind::Collection => Ok(Target::Collection),
                AddressKind::Item => {
                    let id = captures
                        .get(1)
                        .and_then(|m| m.as_str().parse::<i64>().ok())
                        .filter(|id| *id > 0)
                        .ok_or_else(unrecognized)?;
                    Ok(Target::Item(id))
                }
            };
        }

        Err(unrecognized())
    }

    /// Content-type descriptor for whatever the address resolves to.
    pub fn content_type(&self, address: &Address) -> Result<String> {
        Ok(match self.resolve(address)?.kind() {
            AddressKind::Collection => schema::collection_content_type(&self.authority),
            AddressKind::Item => schema::item_content_type(&self.authority),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DEFAULT_AUTHORITY;

    fn matcher() -> AddressMatcher {
        AddressMatcher::new(DEFAULT_AUTHORITY).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let addr = Address::parse("content://com.example.android.inventoryapp/products/7").unwrap();
        assert_eq!(addr.authority(), DEFAULT_AUTHORITY);
        assert_eq!(addr.path(), "products/7");
        assert_eq!(addr.to_string(), "com.example.android.inventoryapp/products/7");
    }

    #[test]
    fn test_parse_rejects_empty_shapes() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("/products").is_err());
        assert!(Address::parse("auth//products").is_err());
    }

    #[test]
    fn test_resolve_collection_and_item() {
        let m = matcher();
        let collection = Address::products(DEFAULT_AUTHORITY);
        assert_eq!(m.resolve(&collection).unwrap(), Target::Collection);

        let item = Address::parse("com.example.android.inventoryapp/products/42").unwrap();
        assert_eq!(m.resolve(&item).unwrap(), Target::Item(42));
    }

    #[test]
    fn test_resolve_unrecognized() {
        let m = matcher();
        for raw in [
            "com.example.android.inventoryapp",
            "com.example.android.inventoryapp/suppliers",
            "com.example.android.inventoryapp/products/abc",
            "com.example.android.inventoryapp/products/0",
            "com.example.android.inventoryapp/products/1/2",
            "com.example.android.inventoryapp/products/99999999999999999999",
            "other.authority/products",
        ] {
            let addr = Address::parse(raw).unwrap();
            assert!(
                matches!(m.resolve(&addr), Err(InventoryError::UnrecognizedAddress(_))),
                "{raw} should not resolve"
            );
        }
    }

    #[test]
    fn test_covers_is_equal_or_ancestor() {
        let collection = Address::products(DEFAULT_AUTHORITY);
        let item = Address::product(DEFAULT_AUTHORITY, 3);
        assert!(collection.covers(&item));
        assert!(collection.covers(&collection));
        assert!(item.covers(&item));
        assert!(!item.covers(&collection));
        assert!(!Address::product(DEFAULT_AUTHORITY, 4).covers(&item));
        assert!(!Address::products("elsewhere").covers(&item));
    }

    #[test]
    fn test_parent_and_append() {
        let item = Address::products(DEFAULT_AUTHORITY).with_appended_id(9);
        assert_eq!(item, Address::product(DEFAULT_AUTHORITY, 9));
        assert_eq!(item.parent(), Some(Address::products(DEFAULT_AUTHORITY)));
    }

    #[test]
    fn test_content_type_per_kind() {
        let m = matcher();
        let dir = m.content_type(&m.collection()).unwrap();
        let item = m.content_type(&Address::product(DEFAULT_AUTHORITY, 1)).unwrap();
        assert_ne!(dir, item);
        assert!(m.content_type(&Address::parse("x/y").unwrap()).is_err());
    }
}
