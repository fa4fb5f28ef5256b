//! Copy-on-write pointers designed for large buffers that are shared across holders
//!
//! An object managed by this module is accessed through two kinds of handles:
//!
//! - [`Shared`]: read only, can be cloned freely and sent to other threads
//!
//! - [`Exclusive`]: read and write, can not be cloned. While an [`Exclusive`] exists,
//!   it is the only handle of the object
//!
//! Objects are always born exclusive ([`Exclusive::create`]), converting an
//! [`Exclusive`] into a [`Shared`] is a move. The way back is [`Shared::mutate`]:
//! if the handle is the unique owner of the object, the object is reused. Otherwise,
//! the object is cloned with [`CowClone::cow_clone`] and the clone is returned.
//!
//! # Why not `Arc::make_mut`
//!
//! `Arc::make_mut` only gives a `&mut T` that can not leave the scope of the `Arc`.
//! We want the mutable state to be a value: the column that is being built can be
//! moved around, and it is converted into a [`Shared`] when it is finished. What's
//! more, containers (arrays of arrays) need to unshare their children recursively,
//! which is described by [`CowClone::mutate_children`].
//!
//! # Compositions
//!
//! Objects may contain other objects through [`Shared`], for example the `ListArray`
//! holds its child array. Cloning a container only bumps the reference count of its
//! children (shallow copy). [`Shared::mutate`] and [`Shared::make_mut`] call
//! [`CowClone::mutate_children`] after they get the unique container, the container
//! calls [`Shared::make_mut`] on each child. Therefore, the whole tree is uniquely
//! owned after mutate.
//!
//! # Thread safety
//!
//! The reference count is atomic. Checking whether the handle is the unique owner is
//! safe even if other threads hold [`Shared`] handles: the count can only increase
//! through an existing handle, if the count is one, the only existing handle is ours.
//! [`Exclusive`] never hands out a second handle, therefore no thread can acquire a
//! [`Shared`] handle of an object that is claimed as exclusive.

use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Trait for objects that can be managed by [`Shared`] and [`Exclusive`]
pub trait CowClone: Sized {
    /// Create a value-identical and independently owned copy of self. Children held
    /// through [`Shared`] can stay shared, they will be unshared by
    /// [`Self::mutate_children`]
    fn cow_clone(&self) -> Self;

    /// Make sure all of the children held through [`Shared`] are uniquely owned by
    /// self. Objects that do not have children can use the default implementation
    #[inline]
    fn mutate_children(&mut self) {}
}

/// Reference counted pointer to the immutable object
pub struct Shared<T>(Arc<T>);

/// Reference counted pointer to the mutable object. It is the unique owner of the
/// object, therefore it can not be cloned
pub struct Exclusive<T>(Arc<T>);

/// Get the mutable reference of the arc that is known to be unique
#[inline]
fn unique_mut<T>(arc: &mut Arc<T>) -> &mut T {
    #[cfg(debug_assertions)]
    {
        Arc::get_mut(arc).expect("Exclusive object must have exactly one owner")
    }

    #[cfg(not(debug_assertions))]
    {
        // SAFETY: `Exclusive` is only constructed from a unique arc and it never hands
        // out another handle
        unsafe { Arc::get_mut(arc).unwrap_unchecked() }
    }
}

impl<T> Shared<T> {
    /// Number of the handles that point to the same object
    #[inline]
    pub fn use_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }

    /// Returns true if two handles point to the same object
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }

    /// Address of the object
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        Arc::as_ptr(&this.0)
    }

    /// Convert self into [`Exclusive`] if self is the unique owner of the object.
    /// Otherwise, self is returned in the error
    #[inline]
    pub fn try_unique(self) -> Result<Exclusive<T>, Self> {
        let mut arc = self.0;
        if Arc::get_mut(&mut arc).is_some() {
            Ok(Exclusive(arc))
        } else {
            Err(Self(arc))
        }
    }

    /// Convert self into [`Exclusive`] without checking the reference count
    ///
    /// # Safety
    ///
    /// Caller should guarantee self is the unique owner of the object, for example
    /// the handle is just converted from an [`Exclusive`]. Otherwise, undefined
    /// behavior happens when the object is mutated
    #[inline]
    pub unsafe fn assume_mutable(self) -> Exclusive<T> {
        debug_assert_eq!(
            Arc::strong_count(&self.0),
            1,
            "`assume_mutable` is called on an object that has other owners"
        );
        Exclusive(self.0)
    }
}

impl<T: CowClone> Shared<T> {
    /// Get the mutable handle of the object. If self is the unique owner of the object,
    /// the object is reused. Otherwise, the object is cloned. In both cases, children
    /// of the object will be unshared
    pub fn mutate(self) -> Exclusive<T> {
        let mut exclusive = match self.try_unique() {
            Ok(exclusive) => exclusive,
            Err(shared) => Exclusive::create(shared.cow_clone()),
        };
        exclusive.mutate_children();
        exclusive
    }

    /// In place version of the [`Self::mutate`]. After this method, self is the
    /// unique owner of the object, other handles keep the old object
    pub fn make_mut(this: &mut Self) -> &mut T {
        if Arc::get_mut(&mut this.0).is_none() {
            this.0 = Arc::new(this.0.cow_clone());
        }
        let object = unique_mut(&mut this.0);
        object.mutate_children();
        object
    }
}

impl<T> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Default> Default for Shared<T> {
    #[inline]
    fn default() -> Self {
        Exclusive::create(T::default()).into()
    }
}

impl<T: Debug> Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shared {{ use_count: {}, data: ", Arc::strong_count(&self.0))?;
        self.0.fmt(f)?;
        write!(f, " }}")
    }
}

impl<T> Exclusive<T> {
    /// Create a new object
    #[inline]
    pub fn create(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Share the object. Same with `Shared::from`
    #[inline]
    pub fn share(self) -> Shared<T> {
        Shared(self.0)
    }

    /// Address of the object
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        Arc::as_ptr(&this.0)
    }

    /// Take the object out of the pointer
    pub fn into_inner(self) -> T {
        match Arc::try_unwrap(self.0) {
            Ok(object) => object,
            Err(_) => unreachable!("Exclusive object must have exactly one owner"),
        }
    }
}

impl<T> From<Exclusive<T>> for Shared<T> {
    #[inline]
    fn from(exclusive: Exclusive<T>) -> Self {
        exclusive.share()
    }
}

impl<T> Deref for Exclusive<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Exclusive<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unique_mut(&mut self.0)
    }
}

impl<T: Default> Default for Exclusive<T> {
    #[inline]
    fn default() -> Self {
        Self::create(T::default())
    }
}

impl<T: Debug> Debug for Exclusive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Exclusive {{ data: ")?;
        self.0.fmt(f)?;
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::Relaxed;

    #[derive(Debug)]
    struct Counted {
        value: i64,
        clones: Arc<AtomicUsize>,
    }

    impl CowClone for Counted {
        fn cow_clone(&self) -> Self {
            self.clones.fetch_add(1, Relaxed);
            Self {
                value: self.value,
                clones: Arc::clone(&self.clones),
            }
        }
    }

    fn counted(value: i64) -> (Exclusive<Counted>, Arc<AtomicUsize>) {
        let clones = Arc::new(AtomicUsize::new(0));
        let object = Exclusive::create(Counted {
            value,
            clones: Arc::clone(&clones),
        });
        (object, clones)
    }

    #[test]
    fn test_mutate_unique_object_reuses_it() {
        let (object, clones) = counted(1);
        let x: Shared<Counted> = object.into();
        let addr = Shared::as_ptr(&x);

        let mut mutate_x = x.mutate();
        mutate_x.value = 2;
        assert_eq!(Exclusive::as_ptr(&mutate_x), addr);
        assert_eq!(clones.load(Relaxed), 0);

        let x = mutate_x.share();
        assert_eq!(x.value, 2);
        assert_eq!(Shared::use_count(&x), 1);
    }

    #[test]
    fn test_mutate_shared_object_clones_it() {
        let (object, clones) = counted(1);
        let x: Shared<Counted> = object.into();
        let y = x.clone();
        assert_eq!(Shared::use_count(&y), 2);

        let mut mutate_x = x.mutate();
        mutate_x.value = 2;
        assert_ne!(Exclusive::as_ptr(&mutate_x), Shared::as_ptr(&y));
        assert_eq!(clones.load(Relaxed), 1);

        let x = mutate_x.share();
        assert_eq!(x.value, 2);
        assert_eq!(y.value, 1);
        assert!(!Shared::ptr_eq(&x, &y));
        assert_eq!(Shared::use_count(&y), 1);
    }

    #[test]
    fn test_make_mut() {
        let (object, clones) = counted(7);
        let mut x: Shared<Counted> = object.into();
        Shared::make_mut(&mut x).value += 1;
        assert_eq!(clones.load(Relaxed), 0);

        let y = x.clone();
        Shared::make_mut(&mut x).value += 1;
        assert_eq!(clones.load(Relaxed), 1);
        assert_eq!(x.value, 9);
        assert_eq!(y.value, 8);
    }

    #[test]
    fn test_try_unique() {
        let (object, _) = counted(3);
        let x = object.share();
        let y = x.clone();
        let x = x.try_unique().unwrap_err();
        drop(y);
        let x = x.try_unique().unwrap();
        assert_eq!(x.into_inner().value, 3);
    }

    #[test]
    fn test_assume_mutable_after_share() {
        let (object, clones) = counted(3);
        let x = object.share();
        let mut x = unsafe { x.assume_mutable() };
        x.value = 4;
        assert_eq!(x.value, 4);
        assert_eq!(clones.load(Relaxed), 0);
    }

    #[derive(Debug)]
    struct Composed {
        name: &'static str,
        child: Shared<Counted>,
    }

    impl CowClone for Composed {
        fn cow_clone(&self) -> Self {
            Self {
                name: self.name,
                child: self.child.clone(),
            }
        }

        fn mutate_children(&mut self) {
            Shared::make_mut(&mut self.child);
        }
    }

    #[test]
    fn test_deep_mutate() {
        let (child, clones) = counted(10);
        let x = Exclusive::create(Composed {
            name: "x",
            child: child.share(),
        })
        .share();
        let y = x.clone();

        let mut mutate_x = x.mutate();
        // The container is cloned shallowly, mutate_children unshares the child
        assert_eq!(clones.load(Relaxed), 1);
        assert_eq!(Shared::use_count(&mutate_x.child), 1);
        Shared::make_mut(&mut mutate_x.child).value = 20;
        mutate_x.name = "mutated";

        assert_eq!(y.child.value, 10);
        assert_eq!(y.name, "x");
        assert_eq!(mutate_x.child.value, 20);
        // No more clones, children are unique now
        assert_eq!(clones.load(Relaxed), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let (object, clones) = counted(5);
        let x = object.share();

        std::thread::scope(|s| {
            for _ in 0..4 {
                let handle = x.clone();
                s.spawn(move || {
                    assert_eq!(handle.value, 5);
                });
            }
        });

        // All of the handles in the threads are dropped
        let mut x = x.mutate();
        x.value = 6;
        assert_eq!(clones.load(Relaxed), 0);
    }

    #[test]
    fn test_debug_shared() {
        let x: Shared<Vec<i32>> = Exclusive::create(vec![1, 2]).into();
        let _y = x.clone();
        expect_test::expect!["Shared { use_count: 2, data: [1, 2] }"].assert_eq(&format!("{x:?}"));
    }
}
