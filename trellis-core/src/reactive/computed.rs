//! Computed Values
//!
//! A computed value caches the result of a getter and recomputes it only
//! after one of the getter's dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect. Nothing happens until the first
//!    read of [`Computed::value`].
//!
//! 2. When a dependency of the getter changes, the effect's scheduler does
//!    not recompute. It marks the value dirty and notifies whoever read the
//!    computed value, through a private anchor target.
//!
//! 3. The next read sees the dirty flag, re-runs the getter and caches the
//!    result. Reads in between return the cache.
//!
//! Readers therefore get scheduled as soon as an input changes, while the
//! getter itself runs at most once per change, and only if someone reads.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, WeakRuntime};
use crate::graph::{DepKey, Operation};
use crate::value::Target;

/// Key readers of a computed value track on its anchor.
const VALUE_KEY: &str = "value";

struct ComputedInner<T: 'static> {
    effect: Effect<T>,
    /// Stand-in target that readers depend on.
    anchor: Target,
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    runtime: WeakRuntime,
}

impl<T: 'static> ComputedInner<T> {
    fn invalidate(&self) {
        self.dirty.set(true);
        if let Some(rt) = self.runtime.upgrade() {
            rt.trigger(&self.anchor, DepKey::Prop(VALUE_KEY.into()), Operation::Set);
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Runtime, Target};
///
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::record([("n", 2)]));
///
/// let s = state.clone();
/// let doubled = rt.computed(move || s.get("n").as_f64().unwrap_or(0.0) * 2.0);
/// assert_eq!(doubled.value(), 4.0);
///
/// state.set("n", 5);
/// assert_eq!(doubled.value(), 10.0);
/// ```
pub struct Computed<T: 'static>(Rc<ComputedInner<T>>);

impl<T: Clone + 'static> Computed<T> {
    /// The current value, recomputed first if an input changed since the
    /// last read. Records a dependency of the active subscriber on it.
    pub fn value(&self) -> T {
        let inner = &self.0;
        let cached = if inner.dirty.get() {
            None
        } else {
            inner.cached.borrow().clone()
        };

        let value = match cached {
            Some(value) => value,
            None => {
                let value = inner.effect.run();
                *inner.cached.borrow_mut() = Some(value.clone());
                inner.dirty.set(false);
                value
            }
        };

        if let Some(rt) = inner.runtime.upgrade() {
            rt.track(&inner.anchor, DepKey::Prop(VALUE_KEY.into()));
        }
        value
    }
}

impl<T: 'static> Computed<T> {
    /// Whether the next read will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    /// Stop following the getter's inputs. The last cached value stays.
    pub fn dispose(&self) {
        self.0.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.effect.is_disposed()
    }

    /// How many times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.0.effect.run_count()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.0.dirty.get())
            .field("cached", &self.0.cached.borrow())
            .field("effect", &self.0.effect)
            .finish()
    }
}

impl Runtime {
    /// Create a computed value over `getter`. The getter does not run until
    /// the first read.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let options = EffectOptions::new().lazy(true).scheduler(move |_| {
                if let Some(inner) = this.upgrade() {
                    inner.invalidate();
                }
            });
            ComputedInner {
                effect: self.effect_with(getter, options),
                anchor: Target::empty_record(),
                cached: RefCell::new(None),
                dirty: Cell::new(true),
                runtime: self.downgrade(),
            }
        });
        Computed(inner)
    }
}
