/// Viewer page: the annotated MJPEG feed plus a panel polling the latest
/// top detection.
pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Live Object Detection</title>
  <style>
    body { margin: 0; font-family: system-ui, sans-serif; background: #0b1220; color: #e2e8f0; }
    main { display: flex; flex-wrap: wrap; gap: 1.5rem; padding: 1.5rem; justify-content: center; }
    .feed { border: 2px solid #1e293b; border-radius: 8px; max-width: 100%; background: #000; }
    .panel { min-width: 16rem; padding: 1rem 1.25rem; border-radius: 8px; background: #111a2e; }
    .panel h2 { margin-top: 0; font-size: 1rem; text-transform: uppercase; letter-spacing: 0.08em; color: #94a3b8; }
    .label { font-size: 1.75rem; font-weight: 600; color: #f0abfc; }
    .confidence { font-size: 1.25rem; }
    .stale { color: #64748b; }
  </style>
</head>
<body>
  <main>
    <img class="feed" src="/video_feed" alt="Live camera feed" />
    <section class="panel">
      <h2>Top detection</h2>
      <div id="label" class="label stale">N/A</div>
      <div id="confidence" class="confidence stale">0.00</div>
    </section>
  </main>
  <script>
    const labelEl = document.getElementById("label");
    const confidenceEl = document.getElementById("confidence");

    async function refresh() {
      try {
        const res = await fetch("/latest_detection_data", { cache: "no-store" });
        const data = await res.json();
        const none = data.class_name === "N/A";
        labelEl.textContent = data.class_name;
        confidenceEl.textContent = Number(data.confidence).toFixed(2);
        labelEl.classList.toggle("stale", none);
        confidenceEl.classList.toggle("stale", none);
      } catch (err) {
        labelEl.classList.add("stale");
      }
    }

    refresh();
    setInterval(refresh, 500);
  </script>
</body>
</html>
"#;
