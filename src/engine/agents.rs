//! Agent snapshots and the per-agent state arena.
//!
//! The host sends whole snapshots; ids may come and go between them. Every
//! id seen in the latest snapshot owns one slot in [`AgentArena`]. Slots are
//! addressed by an [`AgentHandle`] (index + generation), so a handle kept
//! across updates can never alias a different agent that later reuses the
//! slot. An expiry pass after each snapshot frees every slot that was not
//! refreshed, which takes the agent's timer, motion history and crossfade
//! with it.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{error::Error, synth::sample::MAX_POPULATIONS};

use super::allocator::Crossfade;

/// One agent's motion state as produced by the simulation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Agent {
    /// Stable across snapshots.
    pub id: u32,
    pub population: usize,
    /// Normalized position, 0..1. `y` = 0 is the top of the field.
    pub x: f32,
    pub y: f32,
    /// Normalized size, 0..1.
    pub size: f32,
    /// Normalized speed, 0..1.
    pub velocity: f32,
    /// Grain length/overlap control, 0..1.
    pub trail: f32,
    pub is_moving: bool,
    /// Multiplier on the velocity → gain curve exponent.
    pub curve: f32,
    /// User volume scale for this agent.
    pub gain_scale: f32,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            id: 0,
            population: 0,
            x: 0.5,
            y: 0.5,
            size: 0.5,
            velocity: 0.0,
            trail: 0.5,
            is_moving: true,
            curve: 1.0,
            gain_scale: 1.0,
        }
    }
}

impl Agent {
    /// Reject entries the engine cannot interpret.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason| Error::InvalidAgent {
            id: self.id,
            reason,
        };
        if self.population >= MAX_POPULATIONS {
            return Err(invalid("population out of range"));
        }
        let fields = [
            self.x,
            self.y,
            self.size,
            self.velocity,
            self.trail,
            self.curve,
            self.gain_scale,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite field"));
        }
        if self.gain_scale < 0.0 || self.curve < 0.0 {
            return Err(invalid("negative gain parameter"));
        }
        Ok(())
    }
}

/// Generational index into [`AgentArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentHandle {
    index: u32,
    generation: u32,
}

/// Per-agent grain spawn timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainTimer {
    /// Engine time (seconds) of the next grain.
    pub next_grain_time: f64,
    /// Grains per second.
    pub grain_rate: f32,
}

/// Everything the engine remembers about one agent between snapshots.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub agent: Agent,
    pub timer: Option<GrainTimer>,
    /// Motion gate with hysteresis.
    pub audio_active: bool,
    pub crossfade: Option<Crossfade>,
    last_seen: u64,
}

impl AgentState {
    fn new(agent: Agent, stamp: u64) -> Self {
        Self {
            agent,
            timer: None,
            audio_active: false,
            crossfade: None,
            last_seen: stamp,
        }
    }

    pub fn id(&self) -> u32 {
        self.agent.id
    }

    /// Update the motion gate: deactivate below 0.5× threshold, activate
    /// above 1.5× threshold, otherwise keep the current state.
    pub fn update_motion(&mut self, threshold: f32) -> bool {
        let velocity = self.agent.velocity;
        if self.audio_active {
            if velocity < threshold * 0.5 {
                self.audio_active = false;
            }
        } else if velocity > threshold * 1.5 {
            self.audio_active = true;
        }
        self.audio_active
    }

    /// Read the crossfade, dropping it once complete.
    pub fn settle_crossfade(&mut self, now: f64) -> Option<Crossfade> {
        match self.crossfade {
            Some(fade) if fade.is_complete(now) => {
                self.crossfade = None;
                None
            }
            fade => fade,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: Option<AgentState>,
}

/// Result of refreshing an agent from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upsert {
    pub handle: AgentHandle,
    /// Previous population when the agent moved between populations.
    pub moved_from: Option<usize>,
}

#[derive(Debug)]
pub struct AgentArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: HashMap<u32, AgentHandle>,
    stamp: u64,
}

impl AgentArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            stamp: 0,
        }
    }

    /// Start a new snapshot. Agents not refreshed before [`Self::expire`] are removed.
    pub fn begin_update(&mut self) {
        self.stamp += 1;
    }

    /// Insert or refresh `agent` for the current snapshot.
    pub fn upsert(&mut self, agent: Agent) -> Upsert {
        if let Some(&handle) = self.index.get(&agent.id) {
            let stamp = self.stamp;
            if let Some(state) = self.get_mut(handle) {
                let previous = state.agent.population;
                state.agent = agent;
                state.last_seen = stamp;
                return Upsert {
                    handle,
                    moved_from: (previous != agent.population).then_some(previous),
                };
            }
        }

        let state = AgentState::new(agent, self.stamp);
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.state = Some(state);
                AgentHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state: Some(state),
                });
                AgentHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.index.insert(agent.id, handle);
        Upsert {
            handle,
            moved_from: None,
        }
    }

    /// Remove every agent that was not refreshed in the current snapshot.
    pub fn expire(&mut self, mut on_remove: impl FnMut(AgentHandle, &AgentState)) {
        let stamp = self.stamp;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let stale = matches!(&slot.state, Some(state) if state.last_seen != stamp);
            if !stale {
                continue;
            }
            if let Some(state) = slot.state.take() {
                let handle = AgentHandle {
                    index: index as u32,
                    generation: slot.generation,
                };
                on_remove(handle, &state);
                self.index.remove(&state.agent.id);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
    }

    pub fn handle(&self, id: u32) -> Option<AgentHandle> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, handle: AgentHandle) -> Option<&AgentState> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_ref()
    }

    pub fn get_mut(&mut self, handle: AgentHandle) -> Option<&mut AgentState> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_mut()
    }

    pub fn get_by_id(&self, id: u32) -> Option<&AgentState> {
        self.get(self.handle(id)?)
    }

    pub fn get_by_id_mut(&mut self, id: u32) -> Option<&mut AgentState> {
        let handle = self.handle(id)?;
        self.get_mut(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentHandle, &AgentState)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.state.as_ref().map(|state| {
                (
                    AgentHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    state,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AgentHandle, &mut AgentState)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.state.as_mut().map(|state| {
                (
                    AgentHandle {
                        index: index as u32,
                        generation,
                    },
                    state,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop all agent state. Handles issued before remain invalid.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.index.clear();
    }
}
