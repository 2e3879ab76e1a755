use super::VM;

impl VM {
    /// Run the heap garbage collector.
    ///
    /// Returns early if no collection is needed because the heap is still
    /// small. Grays all roots reachable from the VM:
    /// - the operand stack
    /// - the closures of the live call frames
    /// - the open upvalues
    /// - the globals table (keys and values)
    /// - the builtin constants held by the heap itself
    ///
    /// Then traces all references from the roots, prunes dead entries from
    /// the weakly held intern table, and finally sweeps the heap.
    pub(super) fn collect_garbage(&mut self) {
        #[cfg(not(feature = "stress_gc"))]
        if !self.heap.needs_gc() {
            return;
        }

        self.heap.gc_start();

        // Mark roots
        #[cfg(feature = "log_gc")]
        eprintln!("Marking stack values.");
        for value in &self.stack {
            self.heap.mark_value(value);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking callstack closures.");
        for frame in self.callstack.iter() {
            self.heap.mark_closure(frame.closure);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking open upvalues.");
        for upvalue in &self.open_upvalues {
            self.heap.mark_upvalue(*upvalue);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking globals.");
        for (name, value) in &self.globals {
            self.heap.mark_string(*name);
            self.heap.mark_value(value);
        }

        // Trace references
        self.heap.trace();

        // The intern table is a weak set: it is not a root, but any entry
        // whose string did not survive marking has to go before the sweep
        // would leave it dangling.
        let mut strings_by_name = std::mem::take(&mut self.heap.strings_by_name);
        strings_by_name.retain(|_, string_id| {
            #[cfg(feature = "log_gc")]
            if !string_id.marked(&self.heap) {
                eprintln!(
                    "String/{:?} free from intern table {}",
                    string_id,
                    string_id.to_value(&self.heap)
                );
            }
            string_id.marked(&self.heap)
        });
        self.heap.strings_by_name = strings_by_name;

        // Finally, sweep
        self.heap.sweep();
    }
}
