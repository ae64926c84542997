use std::default;

/// Options that change how shape graphs are joined.
#[derive(Clone, Debug, Default)]
pub struct JoinOptions {
    max_guard_depth: usize,
}

impl JoinOptions {
    /// Create a new set of JoinOptions with the default settings.
    pub fn new() -> JoinOptions {
        JoinOptions::default()
    }

    /// Set the maximum number of conditions kept in a guard.
    pub fn set_max_guard_depth(&mut self, max_guard_depth: usize) {
        self.max_guard_depth = max_guard_depth;
    }

    /// The maximum number of conditions a guarded value keeps. Conditions
    /// past this depth are dropped, which only weakens the guard. 0 keeps
    /// every condition.
    pub fn max_guard_depth(&self) -> usize {
        self.max_guard_depth
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `merge::JoinOptions`
pub struct JoinOptionsBuilder {
    options: JoinOptions,
}

impl JoinOptionsBuilder {
    /// Create a new builder for join options.
    pub fn new() -> JoinOptionsBuilder {
        JoinOptionsBuilder {
            options: JoinOptions::default(),
        }
    }

    /// Set the maximum guard depth. By default this is 0, unlimited.
    pub fn max_guard_depth(mut self, max_guard_depth: usize) -> JoinOptionsBuilder {
        self.options.max_guard_depth = max_guard_depth;
        self
    }

    pub fn build(self) -> JoinOptions {
        self.options
    }
}

impl default::Default for JoinOptionsBuilder {
    fn default() -> JoinOptionsBuilder {
        JoinOptionsBuilder::new()
    }
}

#[test]
fn test_builder() {
    assert_eq!(JoinOptions::new().max_guard_depth(), 0);
    let options = JoinOptionsBuilder::new().max_guard_depth(3).build();
    assert_eq!(options.max_guard_depth(), 3);
}
