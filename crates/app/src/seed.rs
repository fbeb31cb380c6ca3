use anyhow::Context;
use curriculum_core::model::Catalog;
use services::CatalogService;

/// Demo curriculum: four semesters, each with a few modules of a few lessons.
const DEMO: &[(&str, &[(&str, &str, &[&str])])] = &[
    (
        "S1",
        &[
            ("MTH101", "Foundations of Mathematics", &["Sets", "Logic", "Proofs"]),
            ("CS101", "Introduction to Programming", &["Variables", "Control flow"]),
        ],
    ),
    (
        "S2",
        &[
            ("MTH201", "Linear Algebra", &["Vectors", "Matrices", "Eigenvalues"]),
            ("CS201", "Data Structures", &["Lists", "Trees", "Hash tables"]),
        ],
    ),
    (
        "S3",
        &[
            ("CS301", "Algorithms", &["Sorting", "Graphs"]),
            ("CS302", "Databases", &["Relational model", "SQL", "Transactions"]),
        ],
    ),
    (
        "S4",
        &[("CS401", "Distributed Systems", &["Consensus", "Replication"])],
    ),
];

/// Write the demo curriculum unless a catalog already exists.
///
/// Returns the catalog as stored afterwards.
pub async fn demo_catalog(catalog: &CatalogService) -> anyhow::Result<Catalog> {
    let existing = catalog.load().await.context("loading catalog")?;
    if !existing.is_empty() {
        tracing::info!(
            modules = existing.modules().len(),
            "catalog already present, skipping seed"
        );
        return Ok(existing);
    }

    for (position, (label, modules)) in (0_u32..).zip(DEMO) {
        let semester = catalog.add_semester(label, position).await?;
        for (order, (code, title, lessons)) in (0_u32..).zip(modules.iter()) {
            let module = catalog.add_module(&semester, order, code, title, None).await?;
            for (lesson_order, lesson) in (0_u32..).zip(lessons.iter()) {
                catalog.add_lesson(module.id(), lesson_order, lesson).await?;
            }
        }
    }

    let seeded = catalog.load().await.context("reloading catalog")?;
    tracing::info!(
        semesters = seeded.semesters().len(),
        modules = seeded.modules().len(),
        lessons = seeded.lessons().len(),
        "demo catalog seeded"
    );
    Ok(seeded)
}
