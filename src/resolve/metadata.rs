use async_recursion::async_recursion;
use tracing::trace;

use crate::cache::fetcher::ArtifactFetcher;
use crate::maven::coordinates::{Coordinate, Dependency};
use crate::maven::pom::{EffectivePom, Pom};
use crate::resolve::error::ResolveError;

/// guards against parent or BOM import cycles
const MAX_POM_NESTING: usize = 32;

/// The dependencies declared by an artifact's POM, after applying its parent chain and imported
///  BOMs. All POMs involved are fetched through (and stored in) the local cache.
pub async fn fetch_metadata(fetcher: &ArtifactFetcher, coordinate: &Coordinate) -> Result<Vec<Dependency>, ResolveError> {
    let pom_coordinate = coordinate.pom();
    let effective = effective_pom(fetcher, &pom_coordinate, 0).await?;
    effective.dependencies()
        .map_err(|e| ResolveError::invalid_metadata(&pom_coordinate, e))
}

#[async_recursion]
async fn effective_pom(fetcher: &ArtifactFetcher, pom_coordinate: &Coordinate, nesting: usize) -> Result<EffectivePom, ResolveError> {
    if nesting > MAX_POM_NESTING {
        return Err(ResolveError::invalid_metadata(pom_coordinate, "parent / import chain is too deep, probably cyclic"));
    }

    let entry = fetcher.fetch_artifact(pom_coordinate).await?;
    let xml = tokio::fs::read(&entry.path).await
        .map_err(|e| ResolveError::Cache {
            coordinate: pom_coordinate.to_string(),
            reason: e.to_string(),
        })?;
    let pom = Pom::parse(&xml)
        .map_err(|e| ResolveError::invalid_metadata(pom_coordinate, e))?;

    let parent = match pom.parent_coordinate().map_err(|e| ResolveError::invalid_metadata(pom_coordinate, e))? {
        Some(parent_coordinate) => {
            trace!("{} inherits from {}", pom_coordinate, parent_coordinate);
            Some(effective_pom(fetcher, &parent_coordinate, nesting + 1).await?)
        }
        None => None,
    };

    let mut effective = EffectivePom::build(&pom, parent.as_ref());
    let imports = effective.imports()
        .map_err(|e| ResolveError::invalid_metadata(pom_coordinate, e))?;
    for bom_coordinate in imports {
        trace!("{} imports {}", pom_coordinate, bom_coordinate);
        let bom = effective_pom(fetcher, &bom_coordinate, nesting + 1).await?;
        effective.import_management(&bom);
    }

    Ok(effective)
}
