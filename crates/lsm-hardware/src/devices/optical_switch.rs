//! Lightsheet optical switch.

use lsm_core::{AppResult, InstrumentError, Variable, VariableSet};

/// Selects which lightsheet channels receive light.
pub struct OpticalSwitch {
    name: String,
    switches: Vec<Variable<bool>>,
    variables: VariableSet,
}

impl OpticalSwitch {
    /// Create a switch for `channels` lightsheets. Channel 0 starts selected.
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        let switches: Vec<Variable<bool>> = (0..channels)
            .map(|i| Variable::new(format!("switch_{}", i), i == 0))
            .collect();
        let mut variables = VariableSet::new();
        for switch in &switches {
            variables.register(switch.clone());
        }
        Self {
            name: name.into(),
            switches,
            variables,
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.switches.len()
    }

    /// Per-channel selection flags
    pub fn switches(&self) -> &[Variable<bool>] {
        &self.switches
    }

    /// Select `channel` and deselect all others.
    pub fn select_only(&self, channel: usize) -> AppResult<()> {
        if channel >= self.switches.len() {
            return Err(InstrumentError::Validation {
                variable: format!("{}.switch_{}", self.name, channel),
                message: format!("switch has only {} channels", self.switches.len()),
            });
        }
        for (i, switch) in self.switches.iter().enumerate() {
            switch.set(i == channel)?;
        }
        Ok(())
    }

    /// Indices of selected channels.
    pub fn selected(&self) -> Vec<usize> {
        self.switches
            .iter()
            .enumerate()
            .filter(|(_, s)| s.get())
            .map(|(i, _)| i)
            .collect()
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_only() {
        let switch = OpticalSwitch::new("OpticalSwitch", 4);
        assert_eq!(switch.selected(), vec![0]);

        switch.select_only(2).unwrap();
        assert_eq!(switch.selected(), vec![2]);

        assert!(switch.select_only(4).is_err());
        assert_eq!(switch.selected(), vec![2]);
    }
}
