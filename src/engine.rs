pub mod cycle {
    /// A clocked component.
    ///
    /// Collaborators of the core (memories, the FPU) advance their internal
    /// time once per core cycle before the core samples their outputs.
    pub trait Component {
        fn cycle(&mut self, cycle: u64);
    }
}
