pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Image Captioner</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f4f5fb;
            display: flex;
            justify-content: center;
            padding: 40px 20px;
            margin: 0;
        }
        .card {
            background: white;
            border-radius: 16px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.12);
            max-width: 720px;
            width: 100%;
            padding: 32px;
        }
        h1 { margin: 0 0 24px; color: #333; }
        .drop {
            border: 3px dashed #5a67d8;
            border-radius: 12px;
            padding: 48px 16px;
            text-align: center;
            cursor: pointer;
            color: #5a67d8;
            font-weight: 600;
        }
        .drop.over { background: #eef0ff; }
        input[type="file"] { display: none; }
        img { max-width: 100%; border-radius: 8px; margin-top: 24px; display: none; }
        .caption { margin-top: 16px; font-size: 1.15em; color: #333; min-height: 1.5em; }
        .error { color: #c33; }
        .links { margin-top: 32px; font-size: 0.85em; }
        .links a { margin-right: 12px; color: #5a67d8; }
    </style>
</head>
<body>
    <div class="card">
        <h1>Image Captioner</h1>
        <div class="drop" id="drop">Click or drop an image here</div>
        <input type="file" id="file" accept="image/*">
        <img id="preview" alt="Preview">
        <div class="caption" id="caption"></div>
        <div class="links">
            <a href="/health">health</a>
            <a href="/logs">logs</a>
            <a href="/file_list">files</a>
        </div>
    </div>

    <script>
        const drop = document.getElementById('drop');
        const input = document.getElementById('file');
        const preview = document.getElementById('preview');
        const caption = document.getElementById('caption');

        drop.addEventListener('click', () => input.click());
        drop.addEventListener('dragover', (e) => { e.preventDefault(); drop.classList.add('over'); });
        drop.addEventListener('dragleave', () => drop.classList.remove('over'));
        drop.addEventListener('drop', (e) => {
            e.preventDefault();
            drop.classList.remove('over');
            const file = e.dataTransfer.files[0];
            if (file) captionFile(file);
        });
        input.addEventListener('change', (e) => {
            const file = e.target.files[0];
            if (file) captionFile(file);
        });

        async function captionFile(file) {
            preview.src = URL.createObjectURL(file);
            preview.style.display = 'block';
            caption.className = 'caption';
            caption.textContent = 'Generating caption...';

            const form = new FormData();
            form.append('image', file);

            try {
                const response = await fetch('/caption', { method: 'POST', body: form });
                const result = await response.json();
                if (!response.ok) throw new Error(result.error || 'Captioning failed');
                caption.textContent = result.caption;
            } catch (err) {
                caption.className = 'caption error';
                caption.textContent = 'Error: ' + err.message;
            }
        }
    </script>
</body>
</html>
"#;
