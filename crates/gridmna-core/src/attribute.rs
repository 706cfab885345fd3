//! Attribute registry: named, typed, read/write handles into live component
//! state, used by the logger and by the power-flow-to-dynamic initialization
//! bridge (§4.8). No raw pointers cross component boundaries — every handle
//! is a pair of get/set thunks closing over the owning component's state.

use std::fmt;
use std::rc::Rc;

/// Value kinds an [`Attribute`] can carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Real(f64),
    Complex(num_complex::Complex64),
    MatrixReal(nalgebra::Matrix3<f64>),
}

/// Read/write capability bits for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeFlags(u8);

impl AttributeFlags {
    pub const READ: AttributeFlags = AttributeFlags(0b01);
    pub const WRITE: AttributeFlags = AttributeFlags(0b10);

    pub fn contains(self, other: AttributeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AttributeFlags {
    type Output = AttributeFlags;
    fn bitor(self, rhs: AttributeFlags) -> AttributeFlags {
        AttributeFlags(self.0 | rhs.0)
    }
}

/// A named, typed handle into a component's internal state.
///
/// Construction closes over the component's owned state (typically via
/// `Rc<RefCell<..>>` shared between the component and its registered
/// attributes), so reading/writing an attribute never requires holding a
/// reference to the component itself.
#[derive(Clone)]
pub struct Attribute {
    name: String,
    flags: AttributeFlags,
    get: Rc<dyn Fn() -> AttributeValue>,
    set: Option<Rc<dyn Fn(AttributeValue)>>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Attribute {
    /// Register a read-only attribute backed by `get`.
    pub fn read_only(name: impl Into<String>, get: impl Fn() -> AttributeValue + 'static) -> Self {
        Self {
            name: name.into(),
            flags: AttributeFlags::READ,
            get: Rc::new(get),
            set: None,
        }
    }

    /// Register a read/write attribute backed by `get` and `set`.
    pub fn read_write(
        name: impl Into<String>,
        get: impl Fn() -> AttributeValue + 'static,
        set: impl Fn(AttributeValue) + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            flags: AttributeFlags::READ | AttributeFlags::WRITE,
            get: Rc::new(get),
            set: Some(Rc::new(set)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> AttributeFlags {
        self.flags
    }

    /// Read the current value.
    pub fn get(&self) -> AttributeValue {
        (self.get)()
    }

    /// Write a new value. No-op if the attribute was registered read-only.
    pub fn set(&self, value: AttributeValue) -> bool {
        match &self.set {
            Some(setter) => {
                setter(value);
                true
            }
            None => false,
        }
    }

    /// Flatten the current value into scalar columns, in the order the
    /// logger writes them to a row (`time` is prepended separately by the
    /// logger itself).
    pub fn to_columns(&self) -> Vec<f64> {
        match self.get() {
            AttributeValue::Real(v) => vec![v],
            AttributeValue::Complex(v) => vec![v.re, v.im],
            AttributeValue::MatrixReal(m) => m.iter().copied().collect(),
        }
    }
}

/// A string-keyed table of a component's exposed attributes, built once at
/// construction (§4.1 item 6).
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    entries: Vec<Attribute>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, attribute: Attribute) {
        self.entries.push(attribute);
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries.iter().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn read_write_round_trips() {
        let state = Rc::new(Cell::new(1.0_f64));
        let read_state = state.clone();
        let write_state = state.clone();
        let attr = Attribute::read_write(
            "v",
            move || AttributeValue::Real(read_state.get()),
            move |v| {
                if let AttributeValue::Real(x) = v {
                    write_state.set(x);
                }
            },
        );

        assert_eq!(attr.get(), AttributeValue::Real(1.0));
        assert!(attr.set(AttributeValue::Real(2.0)));
        assert_eq!(state.get(), 2.0);
    }

    #[test]
    fn read_only_rejects_writes() {
        let attr = Attribute::read_only("i", || AttributeValue::Real(42.0));
        assert!(!attr.set(AttributeValue::Real(0.0)));
        assert_eq!(attr.get(), AttributeValue::Real(42.0));
    }

    #[test]
    fn table_lookup_and_columns() {
        let mut table = AttributeTable::new();
        table.register(Attribute::read_only("p", || {
            AttributeValue::Complex(num_complex::Complex64::new(3.0, 4.0))
        }));
        let attr = table.get("p").expect("registered");
        assert_eq!(attr.to_columns(), vec![3.0, 4.0]);
        assert!(table.get("missing").is_none());
    }
}
