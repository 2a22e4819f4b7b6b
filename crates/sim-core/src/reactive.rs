//! Observable cells and memoised derived values.
//!
//! Every mutation stamps the cell with a fresh value from a thread-local
//! counter. A derived cell remembers the highest stamp among its dependencies
//! when it last ran and recomputes on read once any dependency carries a newer
//! one. Stamps only grow, so the maximum over a collection and its items also
//! moves when an item is removed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

thread_local! {
    static STAMP: Cell<u64> = const { Cell::new(0) };
}

fn next_stamp() -> u64 {
    STAMP.with(|stamp| {
        let next = stamp.get() + 1;
        stamp.set(next);
        next
    })
}

/// Anything a derived cell can depend on.
pub trait Tracked {
    /// Stamp of the most recent change visible through this dependency.
    fn stamp(&self) -> u64;
}

struct TrackedFn<F>(F);

impl<F: Fn() -> u64> Tracked for TrackedFn<F> {
    fn stamp(&self) -> u64 {
        (self.0)()
    }
}

/// Dependency whose stamp is computed on demand, e.g. over a collection of cells.
pub fn tracked(stamp: impl Fn() -> u64 + 'static) -> Box<dyn Tracked> {
    Box::new(TrackedFn(stamp))
}

type Listener<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct ObservableInner<T> {
    value: RefCell<T>,
    stamp: Cell<u64>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_listener: Cell<u64>,
}

/// A mutable value cell that notifies subscribers and derived cells on change.
///
/// Cloning yields another handle to the same cell.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                stamp: Cell::new(next_stamp()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Reads the value in place without cloning it.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.inner.value.borrow())
    }

    /// Stores `value`, notifying only when it differs from the current one.
    pub fn set(&self, value: T) {
        if *self.inner.value.borrow() == value {
            return;
        }
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, change: impl FnOnce(&mut T)) {
        let mut value = self.get();
        change(&mut value);
        self.set(value);
    }

    /// Marks the cell as changed without replacing its value, forcing every
    /// dependent to re-run on its next read.
    pub fn touch(&self) {
        self.notify();
    }

    /// Registers `listener` to run synchronously after each change. The
    /// listener stays registered until the returned [`Subscription`] drops.
    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        let listener: Listener<T> = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().push((id, listener));

        let cell: Weak<ObservableInner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(cell) = cell.upgrade() {
                    let removed: Vec<(u64, Listener<T>)> = {
                        let mut listeners = cell.listeners.borrow_mut();
                        let (gone, kept): (Vec<_>, Vec<_>) =
                            listeners.drain(..).partition(|(lid, _)| *lid == id);
                        *listeners = kept;
                        gone
                    };
                    drop(removed);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Boxed handle for use in a [`Computed`] dependency list.
    pub fn dependency(&self) -> Box<dyn Tracked> {
        Box::new(self.clone())
    }

    fn notify(&self) {
        self.inner.stamp.set(next_stamp());
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let value = self.get();
        for listener in listeners {
            // A listener that re-enters its own cell is skipped rather than aliased.
            if let Ok(mut call) = listener.try_borrow_mut() {
                (&mut *call)(&value);
            }
        }
    }
}

impl<T> Tracked for Observable<T> {
    fn stamp(&self) -> u64 {
        self.inner.stamp.get()
    }
}

/// Handles compare by identity: two handles are equal when they share a cell.
impl<T> PartialEq for Observable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable")
            .field(&*self.inner.value.borrow())
            .finish()
    }
}

/// Keeps a listener registered; unsubscribes on drop.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

struct ComputedInner<T> {
    deps: Vec<Box<dyn Tracked>>,
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<T>,
    seen: Cell<u64>,
    stamp: Cell<u64>,
    evaluating: Cell<bool>,
}

/// A cached value derived from an explicit list of dependencies.
///
/// The value is computed once on construction and again on the first read
/// after any dependency changes. Its own stamp only moves when the recomputed
/// value differs, so chains of derived cells stop propagating at the first
/// unchanged link.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    pub fn new(deps: Vec<Box<dyn Tracked>>, compute: impl Fn() -> T + 'static) -> Self {
        let seen = deps.iter().map(|dep| dep.stamp()).max().unwrap_or(0);
        let cached = compute();
        Self {
            inner: Rc::new(ComputedInner {
                deps,
                compute: Box::new(compute),
                cached: RefCell::new(cached),
                seen: Cell::new(seen),
                stamp: Cell::new(next_stamp()),
                evaluating: Cell::new(false),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.refresh();
        self.inner.cached.borrow().clone()
    }

    pub fn dependency(&self) -> Box<dyn Tracked> {
        Box::new(self.clone())
    }

    fn refresh(&self) {
        let inner = &self.inner;
        assert!(
            !inner.evaluating.get(),
            "dependency cycle between derived values"
        );
        inner.evaluating.set(true);
        let latest = inner.deps.iter().map(|dep| dep.stamp()).max().unwrap_or(0);
        if latest > inner.seen.get() {
            let value = (inner.compute)();
            inner.seen.set(latest);
            if *inner.cached.borrow() != value {
                *inner.cached.borrow_mut() = value;
                inner.stamp.set(next_stamp());
            }
        }
        inner.evaluating.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> Tracked for Computed<T> {
    fn stamp(&self) -> u64 {
        self.refresh();
        self.inner.stamp.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computed")
            .field(&*self.inner.cached.borrow())
            .finish()
    }
}
