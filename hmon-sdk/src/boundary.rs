//! Handle-based API for callers that cannot hold Rust values directly.
//!
//! Objects live in a [`HandleTable`] and are referred to by [`Handle`]s,
//! which can be flattened to a `u64` and back. Handles are move-only: calls
//! that consume an object take the handle by value, all others borrow it.
//! A handle rebuilt from a raw value after its object has been consumed or
//! destroyed is stale, and the slot's generation counter makes sure a
//! recycled slot is never mistaken for the old object.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use hmon_types::{Status, TimeRange};

use crate::deadline::{Deadline, DeadlineMonitor, DeadlineMonitorBuilder, DeadlineOutcome};
use crate::error::BoundaryError;
use crate::heartbeat::{Beat, HeartbeatMonitor, HeartbeatMonitorBuilder};
use crate::monitor::{HealthMonitor, HealthMonitorBuilder};

/// Opaque reference to an object of type `T` in a [`HandleTable`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Flatten into a plain integer for transport.
    pub fn into_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Rebuild a handle from [`into_raw`](Handle::into_raw). The kind is
    /// checked when the handle is used.
    pub fn from_raw(raw: u64) -> Self {
        Self::new(raw as u32, (raw >> 32) as u32)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}#{})", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    value: Option<Box<dyn Any + Send>>,
}

/// Storage for objects handed out through [`Handle`]s.
#[derive(Default)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send>(&mut self, value: T) -> Handle<T> {
        let value: Box<dyn Any + Send> = Box::new(value);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    pub fn get<T: Any>(&self, handle: &Handle<T>) -> Result<&T, BoundaryError> {
        let value = self
            .slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_deref())
            .ok_or(BoundaryError::StaleHandle)?;
        value.downcast_ref().ok_or(BoundaryError::WrongKind)
    }

    pub fn get_mut<T: Any>(&mut self, handle: &Handle<T>) -> Result<&mut T, BoundaryError> {
        let value = self.live_mut(handle)?;
        value.downcast_mut().ok_or(BoundaryError::WrongKind)
    }

    /// Move the object out; the handle is stale afterwards.
    pub fn take<T: Any>(&mut self, handle: Handle<T>) -> Result<T, BoundaryError> {
        if !self.live_mut(&handle)?.is::<T>() {
            return Err(BoundaryError::WrongKind);
        }
        let value = self.release(handle.index).ok_or(BoundaryError::StaleHandle)?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| BoundaryError::WrongKind)
    }

    /// Drop the object; the handle is stale afterwards.
    pub fn destroy<T: Any>(&mut self, handle: Handle<T>) -> Result<(), BoundaryError> {
        self.take(handle).map(drop)
    }

    /// Replace the object in place through `f`, keeping the handle valid.
    pub fn update<T: Any + Send>(
        &mut self,
        handle: &Handle<T>,
        f: impl FnOnce(T) -> T,
    ) -> Result<(), BoundaryError> {
        let slot_value = self.live_mut(handle)?;
        if !slot_value.is::<T>() {
            return Err(BoundaryError::WrongKind);
        }
        let slot = &mut self.slots[handle.index as usize];
        let value = slot
            .value
            .take()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(BoundaryError::StaleHandle)?;
        slot.value = Some(Box::new(f(*value)));
        Ok(())
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_mut<T>(
        &mut self,
        handle: &Handle<T>,
    ) -> Result<&mut (dyn Any + Send + 'static), BoundaryError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_deref_mut())
            .ok_or(BoundaryError::StaleHandle)
    }

    fn release(&mut self, index: u32) -> Option<Box<dyn Any + Send>> {
        let slot = self.slots.get_mut(index as usize)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.len())
            .field("capacity", &self.slots.len())
            .finish()
    }
}

/// The monitoring API expressed over handles.
///
/// Builders are consumed by the calls that use them, so building the same
/// builder handle twice reports [`BoundaryError::StaleHandle`].
#[derive(Debug, Default)]
pub struct Api {
    table: HandleTable,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline_monitor_builder_create(&mut self) -> Handle<DeadlineMonitorBuilder> {
        self.table.insert(DeadlineMonitorBuilder::new())
    }

    pub fn deadline_monitor_builder_add_deadline(
        &mut self,
        builder: &Handle<DeadlineMonitorBuilder>,
        tag: &str,
        min: Duration,
        max: Duration,
    ) -> Result<(), BoundaryError> {
        let range = TimeRange::try_new(min, max)?;
        self.table
            .update(builder, |builder| builder.add_deadline(tag, range))
    }

    pub fn heartbeat_monitor_builder_create(
        &mut self,
        min: Duration,
        max: Duration,
    ) -> Result<Handle<HeartbeatMonitorBuilder>, BoundaryError> {
        let range = TimeRange::try_new(min, max)?;
        Ok(self.table.insert(HeartbeatMonitorBuilder::new(range)))
    }

    pub fn health_monitor_builder_create(&mut self) -> Handle<HealthMonitorBuilder> {
        self.table.insert(HealthMonitorBuilder::new())
    }

    /// Consumes the deadline monitor builder handle.
    pub fn health_monitor_builder_add_deadline_monitor(
        &mut self,
        builder: &Handle<HealthMonitorBuilder>,
        tag: &str,
        monitor: Handle<DeadlineMonitorBuilder>,
    ) -> Result<(), BoundaryError> {
        self.table.get(builder)?;
        let monitor = self.table.take(monitor)?;
        self.table
            .update(builder, |builder| builder.add_deadline_monitor(tag, monitor))
    }

    /// Consumes the heartbeat monitor builder handle.
    pub fn health_monitor_builder_add_heartbeat_monitor(
        &mut self,
        builder: &Handle<HealthMonitorBuilder>,
        tag: &str,
        monitor: Handle<HeartbeatMonitorBuilder>,
    ) -> Result<(), BoundaryError> {
        self.table.get(builder)?;
        let monitor = self.table.take(monitor)?;
        self.table
            .update(builder, |builder| builder.add_heartbeat_monitor(tag, monitor))
    }

    /// Consumes the builder handle.
    pub fn health_monitor_builder_build(
        &mut self,
        builder: Handle<HealthMonitorBuilder>,
        internal_cycle: Duration,
        supervisor_cycle: Duration,
    ) -> Result<Handle<HealthMonitor>, BoundaryError> {
        let monitor = self
            .table
            .take(builder)?
            .with_internal_processing_cycle(internal_cycle)
            .with_supervisor_api_cycle(supervisor_cycle)
            .build()?;
        Ok(self.table.insert(monitor))
    }

    pub fn health_monitor_get_deadline_monitor(
        &mut self,
        health: &Handle<HealthMonitor>,
        tag: &str,
    ) -> Result<Handle<DeadlineMonitor>, BoundaryError> {
        let monitor = self.table.get(health)?.get_deadline_monitor(tag)?;
        Ok(self.table.insert(monitor))
    }

    pub fn health_monitor_get_heartbeat_monitor(
        &mut self,
        health: &Handle<HealthMonitor>,
        tag: &str,
    ) -> Result<Handle<HeartbeatMonitor>, BoundaryError> {
        let monitor = self.table.get(health)?.get_heartbeat_monitor(tag)?;
        Ok(self.table.insert(monitor))
    }

    pub fn health_monitor_start(&mut self, health: &Handle<HealthMonitor>) -> Result<(), BoundaryError> {
        self.table.get_mut(health)?.start()?;
        Ok(())
    }

    pub fn health_monitor_status(&self, health: &Handle<HealthMonitor>) -> Result<Status, BoundaryError> {
        Ok(self.table.get(health)?.status())
    }

    pub fn deadline_monitor_get_deadline(
        &mut self,
        monitor: &Handle<DeadlineMonitor>,
        tag: &str,
    ) -> Result<Handle<Deadline>, BoundaryError> {
        let deadline = self.table.get(monitor)?.get_deadline(tag)?;
        Ok(self.table.insert(deadline))
    }

    pub fn deadline_start(&mut self, deadline: &Handle<Deadline>) -> Result<(), BoundaryError> {
        self.table.get_mut(deadline)?.start()?;
        Ok(())
    }

    pub fn deadline_stop(
        &mut self,
        deadline: &Handle<Deadline>,
    ) -> Result<DeadlineOutcome, BoundaryError> {
        Ok(self.table.get_mut(deadline)?.stop()?)
    }

    pub fn heartbeat_monitor_heartbeat(
        &mut self,
        monitor: &Handle<HeartbeatMonitor>,
    ) -> Result<Beat, BoundaryError> {
        Ok(self.table.get(monitor)?.heartbeat())
    }

    /// Destroy any object created through this API.
    pub fn destroy<T: Any>(&mut self, handle: Handle<T>) -> Result<(), BoundaryError> {
        self.table.destroy(handle)
    }

    pub fn live_objects(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::DeadlineVerdict;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// A second handle to the same slot, as a foreign caller holding the
    /// raw value would have.
    fn duplicate<T>(handle: &Handle<T>) -> Handle<T> {
        Handle::new(handle.index, handle.generation)
    }

    #[test]
    fn take_makes_handle_stale() {
        let mut table = HandleTable::new();
        let handle = table.insert(String::from("value"));
        let copy = duplicate(&handle);
        assert_eq!(table.get(&handle).unwrap(), "value");
        assert_eq!(table.take(handle).unwrap(), "value");
        assert!(matches!(table.get(&copy), Err(BoundaryError::StaleHandle)));
        assert!(matches!(table.take(copy), Err(BoundaryError::StaleHandle)));
    }

    #[test]
    fn recycled_slot_rejects_old_handle() {
        let mut table = HandleTable::new();
        let old = table.insert(1u32);
        let raw = duplicate(&old).into_raw();
        table.destroy(old).unwrap();
        let new = table.insert(2u32);

        let old: Handle<u32> = Handle::from_raw(raw);
        assert_eq!(old.index, new.index);
        assert!(matches!(table.get(&old), Err(BoundaryError::StaleHandle)));
        assert_eq!(*table.get(&new).unwrap(), 2);
    }

    #[test]
    fn raw_handle_of_wrong_kind() {
        let mut table = HandleTable::new();
        let handle = table.insert(7u8);
        let forged: Handle<String> = Handle::from_raw(duplicate(&handle).into_raw());

        assert!(matches!(table.get(&forged), Err(BoundaryError::WrongKind)));
        assert!(matches!(table.take(forged), Err(BoundaryError::WrongKind)));
        assert_eq!(*table.get(&handle).unwrap(), 7);
    }

    #[test]
    fn raw_round_trip() {
        let raw = Handle::<u8>::new(3, 9).into_raw();
        assert_eq!(Handle::<u8>::from_raw(raw), Handle::new(3, 9));
    }

    #[test]
    fn update_keeps_handle() {
        let mut table = HandleTable::new();
        let handle = table.insert(vec![1]);
        table
            .update(&handle, |mut v| {
                v.push(2);
                v
            })
            .unwrap();
        assert_eq!(table.get(&handle).unwrap(), &vec![1, 2]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn full_lifecycle() {
        let mut api = Api::new();

        let deadlines = api.deadline_monitor_builder_create();
        api.deadline_monitor_builder_add_deadline(&deadlines, "frame", ms(0), ms(10_000))
            .unwrap();
        let heartbeat = api
            .heartbeat_monitor_builder_create(ms(0), ms(10_000))
            .unwrap();

        let builder = api.health_monitor_builder_create();
        api.health_monitor_builder_add_deadline_monitor(&builder, "render", deadlines)
            .unwrap();
        api.health_monitor_builder_add_heartbeat_monitor(&builder, "main", heartbeat)
            .unwrap();
        let health = api
            .health_monitor_builder_build(builder, ms(50), ms(100))
            .unwrap();

        let render = api
            .health_monitor_get_deadline_monitor(&health, "render")
            .unwrap();
        let deadline = api.deadline_monitor_get_deadline(&render, "frame").unwrap();
        api.deadline_start(&deadline).unwrap();
        let outcome = api.deadline_stop(&deadline).unwrap();
        assert_eq!(outcome.verdict, DeadlineVerdict::InRange);

        let main = api
            .health_monitor_get_heartbeat_monitor(&health, "main")
            .unwrap();
        assert_eq!(api.heartbeat_monitor_heartbeat(&main).unwrap(), Beat::Accepted);
        assert_eq!(api.health_monitor_status(&health).unwrap(), Status::Running);

        api.destroy(deadline).unwrap();
        api.destroy(render).unwrap();
        api.destroy(main).unwrap();
        api.destroy(health).unwrap();
        assert_eq!(api.live_objects(), 0);
    }

    #[test]
    fn second_build_is_stale() {
        let mut api = Api::new();
        let heartbeat = api.heartbeat_monitor_builder_create(ms(0), ms(100)).unwrap();
        let heartbeat_again = duplicate(&heartbeat);
        let builder = api.health_monitor_builder_create();
        let builder_again = duplicate(&builder);
        api.health_monitor_builder_add_heartbeat_monitor(&builder, "hb", heartbeat)
            .unwrap();

        assert!(api
            .health_monitor_builder_build(builder, ms(100), ms(500))
            .is_ok());
        assert!(matches!(
            api.health_monitor_builder_add_heartbeat_monitor(&builder_again, "hb", heartbeat_again),
            Err(BoundaryError::StaleHandle)
        ));
        assert!(matches!(
            api.health_monitor_builder_build(builder_again, ms(100), ms(500)),
            Err(BoundaryError::StaleHandle)
        ));
    }

    #[test]
    fn consumed_monitor_builder_is_stale() {
        let mut api = Api::new();
        let heartbeat = api.heartbeat_monitor_builder_create(ms(0), ms(100)).unwrap();
        let heartbeat_again = duplicate(&heartbeat);
        let builder = api.health_monitor_builder_create();
        api.health_monitor_builder_add_heartbeat_monitor(&builder, "hb", heartbeat)
            .unwrap();
        assert!(matches!(
            api.health_monitor_builder_add_heartbeat_monitor(&builder, "hb", heartbeat_again),
            Err(BoundaryError::StaleHandle)
        ));
    }

    #[test]
    fn errors_cross_the_boundary() {
        let mut api = Api::new();
        assert!(matches!(
            api.heartbeat_monitor_builder_create(ms(10), ms(1)),
            Err(BoundaryError::InvalidRange(_))
        ));

        let builder = api.health_monitor_builder_create();
        let health = api
            .health_monitor_builder_build(builder, ms(100), ms(500))
            .unwrap();
        assert!(matches!(
            api.health_monitor_get_deadline_monitor(&health, "nope"),
            Err(BoundaryError::Monitor(_))
        ));
        assert!(matches!(
            api.health_monitor_start(&health),
            Err(BoundaryError::Start(_))
        ));

        let deadlines = api.deadline_monitor_builder_create();
        let bad = api.health_monitor_builder_create();
        assert!(matches!(
            api.health_monitor_builder_build(bad, Duration::ZERO, ms(500)),
            Err(BoundaryError::Build(_))
        ));
        api.destroy(deadlines).unwrap();
    }
}
