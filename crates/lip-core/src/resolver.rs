//! Dependency resolution
//!
//! Two views of the dependency graph:
//!
//! - [`LockGraph`] works on what is installed: which packages are still
//!   needed and in which order they can be installed.
//! - [`DependencyResolver`] works on what could be installed: it picks one
//!   version per package so that every dependency range is satisfied.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::identifier::{PackageIdentifier, PackageSpecifier};
use crate::lockfile::{LockedPackage, PackageLock};
use crate::migration::platform;
use crate::semver::{Version, VersionRange};

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// The index has no manifest for a candidate
    #[error("Package not found: {0}")]
    PackageNotFound(String),
}

/// Installed packages that nothing explicitly installed depends on.
///
/// Uses the host platform to select each package's variant.
pub fn get_unnecessary_packages(lock: &PackageLock) -> Vec<PackageIdentifier> {
    LockGraph::new(lock, &platform::host_platform()).unnecessary()
}

/// Dependency edges between the records of a [`PackageLock`]
pub struct LockGraph<'a> {
    packages: &'a [LockedPackage],
    /// `edges[i]` holds the indices that record `i` depends on.
    edges: Vec<Vec<usize>>,
}

impl<'a> LockGraph<'a> {
    /// Build the graph, selecting each record's variant for `platform`.
    ///
    /// Dependencies that are not installed contribute no edge.
    pub fn new(lock: &'a PackageLock, platform: &str) -> Self {
        let index: HashMap<&PackageIdentifier, usize> = lock
            .packages
            .iter()
            .enumerate()
            .rev()
            .map(|(i, p)| (p.identifier(), i))
            .collect();

        let edges = lock
            .packages
            .iter()
            .map(|package| {
                let Some(variant) = package.variant(platform) else {
                    tracing::warn!(
                        package = %package.identifier(),
                        platform,
                        "installed variant does not resolve, ignoring its dependencies"
                    );
                    return Vec::new();
                };
                variant
                    .dependencies
                    .keys()
                    .filter_map(|dep| {
                        let target = index.get(dep).copied();
                        if target.is_none() {
                            tracing::debug!(package = %package.identifier(), dependency = %dep, "dependency not installed");
                        }
                        target
                    })
                    .collect()
            })
            .collect();

        Self {
            packages: &lock.packages,
            edges,
        }
    }

    /// Records not reachable from any locked record, in lock order.
    pub fn unnecessary(&self) -> Vec<PackageIdentifier> {
        let mut reached = vec![false; self.packages.len()];
        let mut queue: VecDeque<usize> = self
            .packages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.locked)
            .map(|(i, _)| i)
            .collect();
        for &root in &queue {
            reached[root] = true;
        }

        while let Some(current) = queue.pop_front() {
            for &next in &self.edges[current] {
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }

        self.packages
            .iter()
            .zip(reached)
            .filter(|(_, reached)| !reached)
            .map(|(p, _)| p.identifier().clone())
            .collect()
    }

    /// Install order: every record comes after the records it depends on.
    ///
    /// Records without ordering constraints keep their lock order.
    pub fn topo_sort(&self) -> Result<Vec<&'a LockedPackage>, ResolverError> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut order = Vec::with_capacity(self.packages.len());

        for i in 0..self.packages.len() {
            if !visited.contains(&i) {
                self.visit(i, &mut visited, &mut stack, &mut order)?;
            }
        }

        Ok(order.into_iter().map(|i| &self.packages[i]).collect())
    }

    fn visit(
        &self,
        package: usize,
        visited: &mut HashSet<usize>,
        stack: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ResolverError> {
        visited.insert(package);
        stack.insert(package);

        for &dep in &self.edges[package] {
            if !visited.contains(&dep) {
                self.visit(dep, visited, stack, order)?;
            } else if stack.contains(&dep) {
                return Err(ResolverError::CircularDependency(format!(
                    "{} -> {}",
                    self.packages[package].identifier(),
                    self.packages[dep].identifier()
                )));
            }
        }

        stack.remove(&package);
        order.push(package);
        Ok(())
    }
}

/// Install order of every record in `lock` on the host platform.
pub fn topo_sort(lock: &PackageLock) -> Result<Vec<&LockedPackage>, ResolverError> {
    LockGraph::new(lock, &platform::host_platform()).topo_sort()
}

/// Source of package versions and their dependencies
pub trait PackageIndex {
    /// Every version known for `identifier`
    fn versions(&self, identifier: &PackageIdentifier) -> Vec<Version>;

    /// Dependencies of one version, `None` when the index has no manifest for it
    fn dependencies(
        &self,
        specifier: &PackageSpecifier,
    ) -> Option<BTreeMap<PackageIdentifier, VersionRange>>;
}

/// In-memory [`PackageIndex`]
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    packages: BTreeMap<PackageIdentifier, BTreeMap<Version, BTreeMap<PackageIdentifier, VersionRange>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one version with its dependencies
    pub fn add(
        &mut self,
        specifier: &PackageSpecifier,
        dependencies: BTreeMap<PackageIdentifier, VersionRange>,
    ) {
        self.packages
            .entry(specifier.identifier().clone())
            .or_default()
            .insert(specifier.version().clone(), dependencies);
    }

    /// Register every record of `lock` using its variant for `platform`
    pub fn add_lock(&mut self, lock: &PackageLock, platform: &str) {
        for package in &lock.packages {
            if let Some(variant) = package.variant(platform) {
                self.add(&package.specifier(), variant.dependencies);
            }
        }
    }
}

impl PackageIndex for MemoryIndex {
    fn versions(&self, identifier: &PackageIdentifier) -> Vec<Version> {
        self.packages
            .get(identifier)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn dependencies(
        &self,
        specifier: &PackageSpecifier,
    ) -> Option<BTreeMap<PackageIdentifier, VersionRange>> {
        self.packages
            .get(specifier.identifier())?
            .get(specifier.version())
            .cloned()
    }
}

/// Search state: versions still possible per package, versions already chosen
#[derive(Debug, Clone)]
struct State {
    candidates: BTreeMap<PackageIdentifier, Vec<Version>>,
    selected: BTreeMap<PackageIdentifier, Version>,
}

impl State {
    /// Drop candidates that were selected. `None` when a package has no
    /// versions left or a selected version was ruled out.
    fn normalized(mut self) -> Option<Self> {
        if self.candidates.values().any(Vec::is_empty) {
            return None;
        }
        for (id, versions) in &self.candidates {
            if let Some(chosen) = self.selected.get(id) {
                if !versions.contains(chosen) {
                    return None;
                }
            }
        }
        let selected = &self.selected;
        self.candidates.retain(|id, _| !selected.contains_key(id));
        Some(self)
    }
}

/// Version selection for an install
pub struct DependencyResolver<'a, I: PackageIndex> {
    index: &'a I,
    installed: HashMap<PackageIdentifier, Version>,
}

impl<'a, I: PackageIndex> DependencyResolver<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self {
            index,
            installed: HashMap::new(),
        }
    }

    /// Prefer these versions when they satisfy every range
    pub fn with_installed(mut self, installed: &[PackageSpecifier]) -> Self {
        self.installed = installed
            .iter()
            .map(|s| (s.identifier().clone(), s.version().clone()))
            .collect();
        self
    }

    /// Pick one version of every package reachable from `primary`.
    ///
    /// Returns `Ok(None)` when no assignment satisfies all ranges.
    pub fn resolve(
        &self,
        primary: &[PackageSpecifier],
    ) -> Result<Option<Vec<PackageSpecifier>>, ResolverError> {
        let mut candidates: BTreeMap<PackageIdentifier, Vec<Version>> = BTreeMap::new();
        for spec in primary {
            let version = spec.version().clone();
            candidates
                .entry(spec.identifier().clone())
                .and_modify(|versions| versions.retain(|v| *v == version))
                .or_insert_with(|| vec![version]);
        }
        let initial = State {
            candidates,
            selected: BTreeMap::new(),
        };

        let Some(initial) = initial.normalized() else {
            return Ok(None);
        };
        Ok(self.search(initial)?.map(|selected| {
            selected
                .into_iter()
                .map(|(id, version)| id.with_version(version))
                .collect()
        }))
    }

    fn search(&self, state: State) -> Result<Option<BTreeMap<PackageIdentifier, Version>>, ResolverError> {
        if state.candidates.is_empty() {
            return Ok(Some(state.selected));
        }
        // Most constrained package first.
        let Some((id, versions)) = state.candidates.iter().min_by_key(|(_, v)| v.len()) else {
            return Ok(None);
        };

        let installed = self.installed.get(id);
        let mut ordered = versions.clone();
        ordered.sort_by(|a, b| {
            let a_installed = Some(a) == installed;
            let b_installed = Some(b) == installed;
            b_installed.cmp(&a_installed).then_with(|| b.cmp(a))
        });

        for version in ordered {
            let spec = id.with_version(version.clone());
            let dependencies = self
                .index
                .dependencies(&spec)
                .ok_or_else(|| ResolverError::PackageNotFound(spec.to_string()))?;

            let mut candidates = state.candidates.clone();
            candidates.remove(id);
            for (dep, range) in &dependencies {
                let allowed: Vec<Version> = self
                    .index
                    .versions(dep)
                    .into_iter()
                    .filter(|v| range.contains(v))
                    .collect();
                candidates
                    .entry(dep.clone())
                    .and_modify(|existing| existing.retain(|v| allowed.contains(v)))
                    .or_insert(allowed);
            }

            let mut selected = state.selected.clone();
            selected.insert(id.clone(), version);

            let next = State {
                candidates,
                selected,
            };
            if let Some(next) = next.normalized() {
                if let Some(found) = self.search(next)? {
                    return Ok(Some(found));
                }
            }
            tracing::debug!(package = %spec, "backtracking");
        }
        Ok(None)
    }
}
